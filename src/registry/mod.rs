//! Registry adapters: where built distributions are announced and uploaded.

mod private;
mod public;

use std::path::Path;

use anyhow::Result;

use crate::api::ApiClient;
use crate::config::RegistrySettings;
use crate::dist::DistFile;
use crate::error::{MurError, codes};
use crate::models::{ArtifactPublishRequest, ArtifactPublishResponse};

pub use private::PrivateRegistry;
pub use public::PublicRegistry;

/// Name and version a distribution is uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub version: String,
}

pub trait RegistryAdapter {
    /// Announces the artifact and returns the upload target for each file type.
    fn publish_artifact(&self, request: &ArtifactPublishRequest) -> Result<ArtifactPublishResponse>;

    fn upload_file(&self, file: &DistFile, upload_url: &str, release: &Release) -> Result<()>;

    /// Indexes to install from, primary first.
    fn package_indexes(&self) -> Result<Vec<String>>;
}

/// Picks the adapter for the configured index. The public registry needs
/// `token` to publish; installs pass `None`.
pub fn registry_adapter(
    settings: &RegistrySettings,
    token: Option<String>,
) -> Result<Box<dyn RegistryAdapter>> {
    if settings.is_private() {
        tracing::info!(index_url = %settings.index_url, "using private package index");
        return Ok(Box::new(PrivateRegistry::new(settings.clone())));
    }
    tracing::info!(server_url = %settings.server_url, "using public Murmur Nexus registry");
    let client = ApiClient::new(&settings.server_url)?;
    Ok(Box::new(PublicRegistry::new(client, token, settings.clone())))
}

pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    Err(MurError::new(
        codes::FILE_NOT_FOUND,
        format!("File not found: {}", path.display()),
    )
    .into())
}

/// Maps a non-success API response onto a coded error. Known body texts win
/// over the status code.
pub fn map_error_response(status: u16, body: &str) -> MurError {
    if body.contains("Token has expired") {
        return MurError::new(codes::TOKEN_EXPIRED, "Token has expired. Please log in again")
            .with_detail("Please run `mur logout` and try again.");
    }
    if body.contains("Could not validate credentials") {
        return MurError::new(codes::INVALID_CREDENTIALS, "Could not validate credentials");
    }
    if body.contains("The package or file already exists in the feed") {
        return MurError::new(codes::VERSION_EXISTS, "Package with version already exists");
    }

    let (code, default_message) = match status {
        400 => (codes::SERVER_RESPONSE, "Bad request"),
        401 => (codes::INVALID_CREDENTIALS, "Unauthorized"),
        403 => (codes::PERMISSION_DENIED, "Permission denied"),
        404 => (codes::SERVER_RESPONSE, "Resource not found"),
        500 => (codes::SERVER_RESPONSE, "Server error"),
        502 => (codes::REGISTRY_UNREACHABLE, "Bad gateway"),
        503 => (codes::CONNECTION_FAILED, "Service unavailable"),
        _ => (codes::SERVER_ERROR, "Server error"),
    };
    let body = body.trim();
    let message = if body.is_empty() { default_message } else { body };
    MurError::new(code, message).with_debug(format!("HTTP status {status}"))
}
