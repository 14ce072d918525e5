use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::api::{ApiClient, ApiResponse};
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{MurError, codes};
use crate::models::{LoginRequest, LoginResponse};
use crate::registry::map_error_response;

/// Resolves and refreshes registry credentials against a store.
pub struct AuthManager<S> {
    store: S,
}

impl<S: CredentialStore> AuthManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn username(&self) -> Result<Option<String>> {
        Ok(self.store.load()?.map(|credentials| credentials.username))
    }

    /// Username of the logged-in user, or a coded error asking to log in.
    pub fn require_username(&self) -> Result<String> {
        self.username()?.ok_or_else(|| not_authenticated().into())
    }

    /// Bearer token for API calls: `MUR_TOKEN` wins over stored credentials.
    pub fn access_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var("MUR_TOKEN")
            && !token.trim().is_empty()
        {
            return Ok(token);
        }
        match self.store.load()? {
            Some(credentials) => Ok(credentials.access_token),
            None => Err(not_authenticated().into()),
        }
    }

    pub fn login(&self, client: &ApiClient, username: &str, password: &str) -> Result<Credentials> {
        let request = LoginRequest::password_grant(username, password);
        let response: ApiResponse<LoginResponse> = client.post_form("/auth/token", &request)?;

        if response.status_code == 401 {
            return Err(MurError::new(
                codes::INVALID_CREDENTIALS,
                "Invalid username or password",
            )
            .into());
        }
        let Some(login) = response.data else {
            return Err(map_error_response(
                response.status_code,
                response.error.as_deref().unwrap_or_default(),
            )
            .into());
        };

        let username = login
            .user
            .as_ref()
            .and_then(|user| user.username.clone())
            .unwrap_or_else(|| username.to_string());
        let credentials = Credentials {
            username,
            access_token: login.access_token,
            refresh_token: login.refresh_token,
            token_type: login.token_type,
            stored_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        };
        self.store
            .save(&credentials)
            .context("failed to store credentials")?;
        tracing::info!(username = %credentials.username, "stored credentials");
        Ok(credentials)
    }

    pub fn logout(&self) -> Result<bool> {
        self.store.clear()
    }
}

pub(crate) fn not_authenticated() -> MurError {
    MurError::new(codes::NOT_AUTHENTICATED, "No authenticated user found")
        .with_detail("Please login first using 'mur login'")
}
