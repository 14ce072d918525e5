use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};

use super::{Release, RegistryAdapter, ensure_exists};
use crate::config::RegistrySettings;
use crate::dist::{self, DistFile};
use crate::error::{MurError, codes};
use crate::models::{
    ArtifactPublishRequest, ArtifactPublishResponse, DistFileType, SignedUploadUrl,
};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_METADATA_VERSION: &str = "2.1";

/// Basic auth username and optional password for uploads.
pub type Credentials = (String, Option<String>);

/// A self-hosted package index speaking the legacy upload protocol.
pub struct PrivateRegistry {
    settings: RegistrySettings,
    credentials: Option<Credentials>,
}

impl PrivateRegistry {
    /// Upload credentials come from `PYPI_USERNAME` and `PYPI_PASSWORD`.
    pub fn new(settings: RegistrySettings) -> Self {
        Self::with_credentials(settings, basic_credentials(|key| std::env::var(key).ok()))
    }

    pub fn with_credentials(settings: RegistrySettings, credentials: Option<Credentials>) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    /// Upload endpoint: the index URL without its `/simple` suffix.
    pub fn repository_url(&self) -> String {
        self.settings
            .index_url
            .trim_end_matches('/')
            .replace("/simple", "")
    }
}

impl RegistryAdapter for PrivateRegistry {
    fn publish_artifact(&self, request: &ArtifactPublishRequest) -> Result<ArtifactPublishResponse> {
        tracing::debug!(name = %request.name, version = %request.version, "preparing private upload");
        let url = self.repository_url();
        Ok(ArtifactPublishResponse {
            status: Some("pending".to_string()),
            message: Some("Ready for file upload".to_string()),
            signed_upload_urls: [DistFileType::Wheel, DistFileType::Source]
                .into_iter()
                .map(|file_type| SignedUploadUrl {
                    file_type,
                    signed_url: url.clone(),
                })
                .collect(),
        })
    }

    fn upload_file(&self, file: &DistFile, upload_url: &str, release: &Release) -> Result<()> {
        ensure_exists(&file.path)?;
        let upload_failed =
            |err: String| MurError::new(codes::GENERIC, format!("Upload failed: {err}"));

        let metadata_version = match file.file_type {
            DistFileType::Wheel => dist::read_wheel_metadata(&file.path)
                .ok()
                .and_then(|meta| meta.metadata_version),
            DistFileType::Source => None,
        }
        .unwrap_or_else(|| DEFAULT_METADATA_VERSION.to_string());

        let content = Part::file(&file.path)
            .map_err(|err| upload_failed(err.to_string()))?
            .file_name(file.filename.clone())
            .mime_str("application/octet-stream")
            .map_err(|err| upload_failed(err.to_string()))?;
        let form = upload_form(file, release, &metadata_version).part("content", content);

        let http = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|err| upload_failed(err.to_string()))?;
        let mut builder = http.post(upload_url).multipart(form);
        if let Some((username, password)) = &self.credentials {
            builder = builder.basic_auth(username, password.as_ref());
        }

        tracing::info!(file = %file.filename, url = upload_url, "uploading to private index");
        let response = builder
            .send()
            .map_err(|err| upload_failed(err.to_string()))?;
        let status = response.status();
        let text = response.text().unwrap_or_default();

        if status.as_u16() == 409 || text.contains("already exists") {
            tracing::warn!(file = %file.filename, "skipping, already exists on the index");
            return Ok(());
        }
        if !status.is_success() {
            return Err(upload_failed(format!("HTTP {}: {}", status.as_u16(), text.trim())).into());
        }
        Ok(())
    }

    fn package_indexes(&self) -> Result<Vec<String>> {
        if self.settings.index_url.trim().is_empty() {
            return Err(MurError::new(
                codes::PRIVATE_REGISTRY_UNSET,
                "No private registry URL configured",
            )
            .with_detail("Set 'index-url' in .murmurrc [murmur-nexus] section.")
            .into());
        }
        Ok(self.settings.package_indexes())
    }
}

/// Reads upload credentials through `lookup`. No username means anonymous.
fn basic_credentials(lookup: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let username = lookup("PYPI_USERNAME").filter(|name| !name.is_empty())?;
    Some((username, lookup("PYPI_PASSWORD")))
}

fn upload_form(file: &DistFile, release: &Release, metadata_version: &str) -> Form {
    let (filetype, pyversion) = match file.file_type {
        DistFileType::Wheel => ("bdist_wheel", "py3"),
        DistFileType::Source => ("sdist", "source"),
    };
    Form::new()
        .text(":action", "file_upload")
        .text("protocol_version", "1")
        .text("name", release.name.clone())
        .text("version", release.version.clone())
        .text("filetype", filetype)
        .text("pyversion", pyversion)
        .text("metadata_version", metadata_version.to_string())
        .text("sha256_digest", file.sha256.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn settings(index_url: &str) -> RegistrySettings {
        RegistrySettings {
            index_url: index_url.to_string(),
            extra_index_urls: vec!["https://pypi.org/simple".to_string()],
            server_url: String::new(),
        }
    }

    fn registry(index_url: &str) -> PrivateRegistry {
        PrivateRegistry::with_credentials(settings(index_url), None)
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    fn sdist(temp: &TempDir) -> DistFile {
        let path = temp.path().join("ada_search-1.0.0.tar.gz");
        std::fs::write(&path, b"sdist").unwrap();
        DistFile::from_path(&path).unwrap().unwrap()
    }

    fn release() -> Release {
        Release {
            name: "ada.search".into(),
            version: "1.0.0".into(),
        }
    }

    #[test]
    fn targets_point_at_repository_url() {
        let registry = registry("https://pypi.corp.example/simple/");
        assert_eq!(registry.repository_url(), "https://pypi.corp.example");
        let response = registry
            .publish_artifact(&ArtifactPublishRequest {
                name: "search".into(),
                version: "1.0.0".into(),
                artifact_type: "tool".into(),
                scope: "ada".into(),
                description: None,
                dependencies: vec![],
                metadata: None,
                instructions: None,
                files: vec![],
            })
            .unwrap();
        assert_eq!(response.status.as_deref(), Some("pending"));
        let types: Vec<_> = response
            .signed_upload_urls
            .iter()
            .map(|target| target.file_type)
            .collect();
        assert_eq!(types, vec![DistFileType::Wheel, DistFileType::Source]);
        assert!(
            response
                .signed_upload_urls
                .iter()
                .all(|target| target.signed_url == "https://pypi.corp.example")
        );
    }

    #[test]
    fn package_indexes_lists_primary_first() {
        let indexes = registry("https://pypi.corp.example/simple")
            .package_indexes()
            .unwrap();
        assert_eq!(
            indexes,
            vec!["https://pypi.corp.example/simple", "https://pypi.org/simple"]
        );
    }

    #[test]
    fn empty_index_url_is_unset_registry() {
        let err = registry("  ").package_indexes().unwrap_err();
        assert_eq!(
            crate::error::find_mur_error(&err).map(|e| e.code),
            Some(codes::PRIVATE_REGISTRY_UNSET)
        );
    }

    #[test]
    fn credentials_come_from_pypi_variables() {
        assert_eq!(
            basic_credentials(env(&[("PYPI_USERNAME", "ada"), ("PYPI_PASSWORD", "secret")])),
            Some(("ada".to_string(), Some("secret".to_string())))
        );
        assert_eq!(
            basic_credentials(env(&[("PYPI_USERNAME", "ada")])),
            Some(("ada".to_string(), None))
        );
        assert_eq!(basic_credentials(env(&[("PYPI_PASSWORD", "secret")])), None);
        assert_eq!(basic_credentials(env(&[("PYPI_USERNAME", "")])), None);
    }

    #[test]
    fn upload_posts_legacy_form_with_basic_auth() {
        let temp = TempDir::new().unwrap();
        let file = sdist(&temp);
        let digest = file.sha256.clone();
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .header("authorization", "Basic YWRhOnNlY3JldA==")
                .body_includes("name=\":action\"\r\n\r\nfile_upload")
                .body_includes("name=\"protocol_version\"\r\n\r\n1")
                .body_includes("name=\"name\"\r\n\r\nada.search")
                .body_includes("name=\"version\"\r\n\r\n1.0.0")
                .body_includes("name=\"filetype\"\r\n\r\nsdist")
                .body_includes("name=\"pyversion\"\r\n\r\nsource")
                .body_includes(format!("name=\"sha256_digest\"\r\n\r\n{digest}"))
                .body_includes("name=\"content\"; filename=\"ada_search-1.0.0.tar.gz\"");
            then.status(200);
        });
        let credentials =
            basic_credentials(env(&[("PYPI_USERNAME", "ada"), ("PYPI_PASSWORD", "secret")]));
        PrivateRegistry::with_credentials(settings(&server.url("/simple")), credentials)
            .upload_file(&file, &server.url("/"), &release())
            .unwrap();
        mock.assert();
    }

    #[test]
    fn anonymous_upload_sends_no_authorization() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/").header_missing("authorization");
            then.status(200);
        });
        let temp = TempDir::new().unwrap();
        registry(&server.url("/simple"))
            .upload_file(&sdist(&temp), &server.url("/"), &release())
            .unwrap();
        mock.assert();
    }

    #[test]
    fn bad_request_for_existing_file_is_skipped() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(400)
                .body("400 File already exists 'ada_search-1.0.0.tar.gz'");
        });
        let temp = TempDir::new().unwrap();
        registry(&server.url("/simple"))
            .upload_file(&sdist(&temp), &server.url("/"), &release())
            .unwrap();
        mock.assert();
    }

    #[test]
    fn conflict_is_skipped() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(409).body("File already exists");
        });
        let temp = TempDir::new().unwrap();
        registry(&server.url("/simple"))
            .upload_file(&sdist(&temp), &server.url("/"), &release())
            .unwrap();
    }

    #[test]
    fn server_failure_is_generic_upload_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(500).body("boom");
        });
        let temp = TempDir::new().unwrap();
        let err = registry(&server.url("/simple"))
            .upload_file(&sdist(&temp), &server.url("/"), &release())
            .unwrap_err();
        let mur = crate::error::find_mur_error(&err).unwrap();
        assert_eq!(mur.code, codes::GENERIC);
        assert!(mur.message.contains("boom"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let mut file = sdist(&temp);
        file.path = temp.path().join("gone.tar.gz");
        let err = registry("https://pypi.corp.example/simple")
            .upload_file(&file, "http://127.0.0.1:9/", &release())
            .unwrap_err();
        assert_eq!(
            crate::error::find_mur_error(&err).map(|e| e.code),
            Some(codes::FILE_NOT_FOUND)
        );
    }
}
