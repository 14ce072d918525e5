use anyhow::{Context, Result};
use dialoguer::{Input, Password};

use crate::api::ApiClient;
use crate::auth::AuthManager;
use crate::cli::LoginArgs;
use crate::config::{RcPaths, server_url};
use crate::credentials::{CredentialStore, FileCredentialStore};

pub fn run_login(args: LoginArgs) -> Result<()> {
    let username = match args.username {
        Some(username) => username,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .context("failed to read username")?,
    };
    let password = match args.password {
        Some(password) => password,
        None => Password::new()
            .with_prompt("Password")
            .interact()
            .context("failed to read password")?,
    };

    let server = server_url(&RcPaths::discover()?)?;
    let client = ApiClient::new(&server)?;
    let auth = AuthManager::new(FileCredentialStore::discover()?);
    login_with(&auth, &client, &username, &password)
}

pub fn login_with<S: CredentialStore>(
    auth: &AuthManager<S>,
    client: &ApiClient,
    username: &str,
    password: &str,
) -> Result<()> {
    tracing::debug!(server = client.base_url(), "logging in");
    let credentials = auth.login(client, username, password)?;
    println!("✓ Logged in as {}", credentials.username);
    Ok(())
}

pub fn run_logout() -> Result<()> {
    let auth = AuthManager::new(FileCredentialStore::discover()?);
    if auth.logout()? {
        println!("✓ Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(())
}
