use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Registry credentials persisted between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub stored_at: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Storage backend for credentials.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    /// Returns whether anything was removed.
    fn clear(&self) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `MUR_CREDENTIALS_PATH`, else `~/.murmur/credentials.json`.
    pub fn discover() -> Result<Self> {
        if let Some(raw) = std::env::var_os("MUR_CREDENTIALS_PATH") {
            return Ok(Self::new(raw));
        }
        let mut path = dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
        path.push(".murmur");
        path.push("credentials.json");
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let credentials = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        // Staged next to the target and renamed; the target is never half-written.
        let mut staged = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to stage credentials in {}", parent.display()))?;
        let rendered =
            serde_json::to_string_pretty(credentials).context("failed to render credentials")?;
        staged
            .write_all(rendered.as_bytes())
            .context("failed to write credentials")?;
        restrict_permissions(staged.path())?;
        staged
            .persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to remove {}", self.path.display()))?;
        Ok(true)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
