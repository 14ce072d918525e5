use std::path::Path;

use anyhow::{Context, Result};

use crate::auth::AuthManager;
use crate::config::{RcPaths, RegistrySettings};
use crate::credentials::FileCredentialStore;
use crate::dist::{self, DistFile};
use crate::error::{MurError, codes};
use crate::manifest::{ArtifactKind, ArtifactMetadata, BuildManifest};
use crate::models::{ArtifactPublishRequest, DistFileType};
use crate::pyproject;
use crate::registry::{RegistryAdapter, Release, registry_adapter};

pub fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("unable to determine current directory")?;
    let paths = RcPaths::discover()?;
    let settings = RegistrySettings::load_or_init(&paths)?;
    let auth = AuthManager::new(FileCredentialStore::discover()?);
    let username = auth.require_username()?;
    let token = if settings.is_private() {
        None
    } else {
        Some(auth.access_token()?)
    };
    let adapter = registry_adapter(&settings, token)?;
    publish_artifact(&cwd, &username, adapter.as_ref())
}

pub fn publish_artifact(cwd: &Path, username: &str, adapter: &dyn RegistryAdapter) -> Result<()> {
    let manifest = BuildManifest::load_from_dir(cwd)?;
    let dist_dir = cwd.join(manifest.package_dir_name()).join("dist");
    let files = dist::discover(&dist_dir)?;
    if files.is_empty() {
        return Err(MurError::new(codes::FILE_NOT_FOUND, "No distribution files found")
            .with_detail(format!(
                "Nothing to publish in {}. Run 'mur build' first.",
                dist_dir.display()
            ))
            .into());
    }
    verify_wheel_versions(&files, &manifest.version)?;

    let request = publish_request(&manifest, username, &files)?;
    let response = adapter.publish_artifact(&request)?;
    let release = Release {
        name: pyproject::project_name(username, &manifest),
        version: manifest.version.clone(),
    };

    for target in &response.signed_upload_urls {
        let matching: Vec<&DistFile> = files
            .iter()
            .filter(|file| file.file_type == target.file_type)
            .collect();
        if matching.is_empty() {
            tracing::warn!(file_type = target.file_type.as_str(), "no distribution for upload target");
            continue;
        }
        for file in matching {
            adapter.upload_file(file, &target.signed_url, &release)?;
        }
    }

    println!(
        "✓ Successfully published {} {} {}",
        manifest.kind, manifest.name, manifest.version
    );
    Ok(())
}

fn verify_wheel_versions(files: &[DistFile], expected: &str) -> Result<()> {
    for file in files.iter().filter(|f| f.file_type == DistFileType::Wheel) {
        let metadata = dist::read_wheel_metadata(&file.path).map_err(|err| {
            MurError::new(codes::DIST_MISMATCH, format!("Failed to read {}", file.filename))
                .with_source(err)
        })?;
        if canonical_version(&metadata.version) != canonical_version(expected) {
            return Err(MurError::new(
                codes::DIST_MISMATCH,
                "Built distribution does not match murmur-build.yaml",
            )
            .with_detail(format!(
                "{} has version {} but the manifest declares {expected}. Remove the artifact \
                 directory and run 'mur build' again.",
                file.filename, metadata.version
            ))
            .into());
        }
    }
    Ok(())
}

fn canonical_version(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    lowered.strip_prefix('v').unwrap_or(&lowered).to_string()
}

fn publish_request(
    manifest: &BuildManifest,
    username: &str,
    files: &[DistFile],
) -> Result<ArtifactPublishRequest> {
    let metadata = if manifest.metadata == ArtifactMetadata::default() {
        None
    } else {
        Some(serde_json::to_value(&manifest.metadata).context("failed to encode metadata")?)
    };
    let instructions = match manifest.kind {
        ArtifactKind::Agent => manifest.instructions.clone(),
        ArtifactKind::Tool => None,
    };
    Ok(ArtifactPublishRequest {
        name: manifest.name.clone(),
        version: manifest.version.clone(),
        artifact_type: manifest.kind.as_str().to_string(),
        scope: username.to_string(),
        description: manifest.description.clone(),
        dependencies: manifest.dependencies.clone(),
        metadata,
        instructions,
        files: files.iter().map(DistFile::to_publish_file).collect(),
    })
}
