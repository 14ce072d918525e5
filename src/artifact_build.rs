use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::auth::AuthManager;
use crate::credentials::FileCredentialStore;
use crate::delegate::build_tool::BuildToolDelegate;
use crate::dist::{self, DistFile};
use crate::error::{MurError, codes, ensure_coded};
use crate::manifest::{BUILD_MANIFEST_FILE, BuildManifest};
use crate::pyproject;
use crate::util::progress::Spinner;

#[derive(Debug)]
pub enum BuildOutcome {
    /// The artifact directory already existed.
    Skipped { artifact_dir: PathBuf },
    Built {
        artifact_dir: PathBuf,
        files: Vec<DistFile>,
    },
}

pub fn run(verbose: bool) -> Result<()> {
    let auth = AuthManager::new(FileCredentialStore::discover()?);
    let username = auth.require_username()?;
    let cwd = std::env::current_dir().context("unable to determine current directory")?;
    build_artifact(&cwd, &username, verbose, BuildToolDelegate::discover)?;
    Ok(())
}

pub fn build_artifact(
    cwd: &Path,
    username: &str,
    verbose: bool,
    resolve_tool: impl FnOnce() -> Result<BuildToolDelegate>,
) -> Result<BuildOutcome> {
    let manifest = BuildManifest::load_from_dir(cwd)?;
    let dir_name = manifest.package_dir_name();
    let artifact_dir = cwd.join(&dir_name);

    if artifact_dir.exists() {
        println!(
            "The {} '{dir_name}' has already been built in this directory. To rebuild, please \
             remove the existing {dir_name} directory first.",
            manifest.kind
        );
        return Ok(BuildOutcome::Skipped { artifact_dir });
    }

    let spinner = Spinner::start(format!("Building {} {dir_name}", manifest.kind), verbose);
    let built = build_steps(cwd, &artifact_dir, &manifest, username, verbose, resolve_tool);
    spinner.finish();

    let files = match built {
        Ok(files) => files,
        Err(err) => {
            // A half-scaffolded directory would make the next build a no-op.
            if let Err(cleanup) = fs::remove_dir_all(&artifact_dir) {
                tracing::warn!(%cleanup, dir = %artifact_dir.display(), "failed to remove partial build");
            }
            return Err(err);
        }
    };

    for file in &files {
        tracing::info!(file = %file.filename, sha256 = %file.sha256, "built");
    }
    println!(
        "✓ Successfully built {} {} {}",
        manifest.kind, manifest.name, manifest.version
    );
    Ok(BuildOutcome::Built {
        artifact_dir,
        files,
    })
}

fn build_steps(
    cwd: &Path,
    artifact_dir: &Path,
    manifest: &BuildManifest,
    username: &str,
    verbose: bool,
    resolve_tool: impl FnOnce() -> Result<BuildToolDelegate>,
) -> Result<Vec<DistFile>> {
    let package_dir = scaffold(cwd, artifact_dir, manifest)
        .map_err(|err| ensure_coded(err, codes::SCAFFOLD_FAILED, "Failed to create directory structure"))?;

    write_project_files(artifact_dir, manifest, username).map_err(|err| {
        ensure_coded(err, codes::PROJECT_FILES_FAILED, "Failed to create project files")
    })?;

    let rendered = manifest.filtered_yaml().and_then(|yaml| {
        let target = package_dir.join(BUILD_MANIFEST_FILE);
        fs::write(&target, yaml).with_context(|| format!("failed to write {}", target.display()))
    });
    rendered.map_err(|err| ensure_coded(err, codes::MANIFEST_IO, "Failed to write murmur-build.yaml"))?;

    let tool = resolve_tool()
        .map_err(|err| ensure_coded(err, codes::BUILD_FAILED, "Build tool is not available"))?;
    run_build_tool(&tool, artifact_dir, verbose)
}

/// Creates `src/murmur/<kind>s/<dir>/` with `__init__.py` and `main.py`.
fn scaffold(cwd: &Path, artifact_dir: &Path, manifest: &BuildManifest) -> Result<PathBuf> {
    let dir_name = manifest.package_dir_name();
    let package_dir = artifact_dir
        .join("src")
        .join("murmur")
        .join(manifest.kind.plural())
        .join(&dir_name);
    fs::create_dir_all(&package_dir)
        .with_context(|| format!("failed to create {}", package_dir.display()))?;
    fs::write(package_dir.join("__init__.py"), "")
        .with_context(|| format!("failed to write __init__.py in {}", package_dir.display()))?;

    let main_source = cwd.join("src").join("main.py");
    if main_source.is_file() {
        fs::copy(&main_source, package_dir.join("main.py"))
            .with_context(|| format!("failed to copy {}", main_source.display()))?;
        tracing::debug!(to = %package_dir.display(), "copied main.py");
    } else if has_python_sources(&cwd.join("src"))? {
        return Err(MurError::new(codes::FILE_NOT_FOUND, "main.py is missing")
            .with_detail(
                "Source files found but main.py is missing. main.py is required as the \
                 default entry point.",
            )
            .into());
    } else {
        fs::write(package_dir.join("main.py"), default_main(&dir_name))
            .context("failed to write default main.py")?;
        tracing::debug!(dir = %package_dir.display(), "wrote default main.py");
    }
    Ok(package_dir)
}

fn has_python_sources(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "py") {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn default_main(dir_name: &str) -> String {
    format!("from murmur.build import ActivateAgent\n\n{dir_name} = ActivateAgent('{dir_name}')\n")
}

fn write_project_files(artifact_dir: &Path, manifest: &BuildManifest, username: &str) -> Result<()> {
    let readme = format!(
        "# {}\n\n{}",
        manifest.name,
        manifest.description.as_deref().unwrap_or_default()
    );
    fs::write(artifact_dir.join("README.md"), readme).context("failed to write README.md")?;
    fs::write(
        artifact_dir.join("pyproject.toml"),
        pyproject::render(manifest, username),
    )
    .context("failed to write pyproject.toml")?;
    tracing::debug!(dir = %artifact_dir.display(), "wrote project files");
    Ok(())
}

fn run_build_tool(tool: &BuildToolDelegate, artifact_dir: &Path, verbose: bool) -> Result<Vec<DistFile>> {
    let dist_dir = artifact_dir.join("dist");
    let output = tool.build(artifact_dir, &dist_dir, verbose).map_err(|err| {
        MurError::new(codes::BUILD_FAILED, "Failed to run build tool").with_source(err)
    })?;
    if !output.success() {
        let mut error = MurError::new(codes::BUILD_FAILED, "Failed to build package").with_debug(
            format!("exit status: {:?}", output.status.code()),
        );
        let captured = output.combined_text();
        if !captured.is_empty() {
            error = error.with_detail(captured);
        }
        return Err(error.into());
    }

    let files = dist::discover(&dist_dir)?;
    if files.is_empty() {
        return Err(MurError::new(codes::BUILD_FAILED, "No package files were produced")
            .with_detail(format!("Expected .whl or .tar.gz files in {}", dist_dir.display()))
            .into());
    }
    Ok(files)
}
