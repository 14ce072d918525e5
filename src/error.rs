use std::fmt;

use thiserror::Error;

/// Numeric error codes surfaced to users. Grouped by hundreds:
/// 2xx local files, 3xx install/uninstall, 4xx config and auth,
/// 5xx API/auth failures, 6xx and 8xx registry responses.
pub mod codes {
    pub const GENERIC: u16 = 200;
    pub const FILE_NOT_FOUND: u16 = 201;
    pub const MANIFEST_IO: u16 = 205;
    pub const BUILD_FAILED: u16 = 206;
    pub const INVALID_ARTIFACT_TYPE: u16 = 207;
    pub const INVALID_NAME_VERSION: u16 = 208;
    pub const SCAFFOLD_FAILED: u16 = 209;
    pub const PROJECT_FILES_FAILED: u16 = 210;
    pub const NAMESPACE_MISSING: u16 = 211;
    pub const REGISTRY_CONFIG: u16 = 213;
    pub const DIST_MISMATCH: u16 = 214;
    pub const INSTALL_FAILED: u16 = 300;
    pub const VERSION_EXISTS: u16 = 302;
    pub const INSTALL_PROCESS_FAILED: u16 = 307;
    pub const MURMUR_NOT_INSTALLED: u16 = 308;
    pub const UNINSTALL_FAILED: u16 = 309;
    pub const NOT_AUTHENTICATED: u16 = 401;
    pub const CONFIG_SET: u16 = 401;
    pub const CONFIG_GET: u16 = 402;
    pub const CONFIG_LIST: u16 = 403;
    pub const CONFIG_UNSET: u16 = 404;
    pub const CONFIG_INIT: u16 = 405;
    pub const API_REQUEST: u16 = 501;
    pub const INVALID_CREDENTIALS: u16 = 502;
    pub const TOKEN_EXPIRED: u16 = 504;
    pub const PERMISSION_DENIED: u16 = 505;
    pub const SERVER_RESPONSE: u16 = 600;
    pub const SERVER_ERROR: u16 = 800;
    pub const CONNECTION_ERROR: u16 = 803;
    pub const CONNECTION_FAILED: u16 = 804;
    pub const REGISTRY_UNREACHABLE: u16 = 806;
    pub const PRIVATE_REGISTRY_UNSET: u16 = 807;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("Error"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

/// A user-facing failure with a stable code.
///
/// Plumbing code returns `anyhow::Result` and attaches `MurError` where the
/// failure has a meaning the user can act on; `main` finds it again by
/// walking the error chain.
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct MurError {
    pub code: u16,
    pub message: String,
    pub detail: Option<String>,
    pub severity: Severity,
    pub debug_messages: Vec<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl MurError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            severity: Severity::Error,
            debug_messages: Vec::new(),
            source: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        let source: anyhow::Error = source.into();
        self.source = Some(source.into());
        self
    }

    pub fn with_debug(mut self, message: impl Into<String>) -> Self {
        self.debug_messages.push(message.into());
        self
    }

    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Human rendering used by the binary.
    pub fn render(&self, verbose: bool) -> String {
        let mut out = format!("{} [{}]: {}", self.severity, self.code, self.message);
        if let Some(detail) = &self.detail {
            out.push_str(&format!("\n  {detail}"));
        }
        if verbose {
            for message in &self.debug_messages {
                out.push_str(&format!("\n  debug: {message}"));
            }
            if let Some(source) = &self.source {
                out.push_str(&format!("\n  caused by: {source}"));
            }
        }
        out
    }
}

/// Finds the first `MurError` in an anyhow chain.
pub fn find_mur_error(err: &anyhow::Error) -> Option<&MurError> {
    err.chain().find_map(|cause| cause.downcast_ref::<MurError>())
}

/// Wraps any non-`MurError` failure into one with the given code, keeping
/// existing `MurError`s untouched.
pub fn ensure_coded(err: anyhow::Error, code: u16, message: impl Into<String>) -> anyhow::Error {
    if find_mur_error(&err).is_some() {
        return err;
    }
    MurError::new(code, message).with_source(err).into()
}
