use std::fs::File;
use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::{Body, Client};
use reqwest::header::CONTENT_TYPE;

use super::{Release, RegistryAdapter, ensure_exists, map_error_response};
use crate::api::ApiClient;
use crate::auth::not_authenticated;
use crate::config::RegistrySettings;
use crate::dist::DistFile;
use crate::error::{MurError, codes};
use crate::models::{ArtifactPublishRequest, ArtifactPublishResponse};
use crate::util::progress;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// The public Murmur Nexus registry: artifacts are announced to the API,
/// which answers with signed upload URLs.
pub struct PublicRegistry {
    client: ApiClient,
    token: Option<String>,
    settings: RegistrySettings,
}

impl PublicRegistry {
    pub fn new(client: ApiClient, token: Option<String>, settings: RegistrySettings) -> Self {
        Self {
            client,
            token,
            settings,
        }
    }
}

impl RegistryAdapter for PublicRegistry {
    fn publish_artifact(&self, request: &ArtifactPublishRequest) -> Result<ArtifactPublishResponse> {
        let token = self.token.as_deref().ok_or_else(not_authenticated)?;
        tracing::debug!(name = %request.name, version = %request.version, "publishing artifact");
        let response = self
            .client
            .post_json::<_, ArtifactPublishResponse>("/artifacts", request, Some(token))?;
        if response.status_code != 200 {
            let body = response.error.as_deref().unwrap_or("Unknown error");
            return Err(map_error_response(response.status_code, body).into());
        }
        match response.data {
            Some(data) => Ok(data),
            None => Err(MurError::new(
                codes::SERVER_RESPONSE,
                "Unexpected response from server",
            )
            .with_detail(response.error.unwrap_or_default())
            .into()),
        }
    }

    fn upload_file(&self, file: &DistFile, upload_url: &str, _release: &Release) -> Result<()> {
        ensure_exists(&file.path)?;
        let upload_failed = |err: String| MurError::new(codes::GENERIC, format!("Upload failed: {err}"));

        let handle = File::open(&file.path).map_err(|err| upload_failed(err.to_string()))?;
        let bar = progress::upload_bar(file.size, &file.filename);
        let body = Body::sized(bar.wrap_read(handle), file.size);

        let http = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|err| upload_failed(err.to_string()))?;
        let response = http
            .put(upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .map_err(|err| upload_failed(err.to_string()))?;
        bar.finish_and_clear();

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(MurError::new(
                codes::SERVER_ERROR,
                format!("Failed to upload file: {text}"),
            )
            .with_debug(format!("HTTP status {}", status.as_u16()))
            .into());
        }
        tracing::info!(file = %file.filename, "uploaded");
        Ok(())
    }

    fn package_indexes(&self) -> Result<Vec<String>> {
        Ok(self.settings.package_indexes())
    }
}
