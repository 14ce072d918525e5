use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use httpmock::prelude::*;
use predicates::str::contains;
use serde_json::{Value, json};
use tempfile::tempdir;

#[test]
fn login_stores_credentials_and_logout_removes_them() {
    let server = MockServer::start();
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/auth/token")
            .header("content-type", "application/x-www-form-urlencoded");
        then.status(200).json_body(json!({
            "access_token": "tok-123",
            "refresh_token": "ref-456",
            "token_type": "bearer",
            "user": { "username": "ada" }
        }));
    });

    let work = tempdir().unwrap();
    let home = tempdir().unwrap();
    let credentials = home.path().join("credentials.json");

    cargo_bin_cmd!("mur")
        .current_dir(work.path())
        .env("MURMURRC_PATH", home.path().join(".murmurrc"))
        .env("MUR_CREDENTIALS_PATH", &credentials)
        .env("MURMUR_SERVER_URL", server.base_url())
        .args(["login", "-u", "ada", "-p", "secret"])
        .assert()
        .success()
        .stdout(contains("Logged in as ada"));
    token.assert();

    let stored: Value = serde_json::from_str(&fs::read_to_string(&credentials).unwrap()).unwrap();
    assert_eq!(stored["username"], "ada");
    assert_eq!(stored["access_token"], "tok-123");

    cargo_bin_cmd!("mur")
        .env("MUR_CREDENTIALS_PATH", &credentials)
        .arg("logout")
        .assert()
        .success()
        .stdout(contains("Logged out"));
    assert!(!credentials.exists());
}

#[test]
fn rejected_login_exits_with_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/token");
        then.status(401).body("{\"detail\":\"Incorrect username or password\"}");
    });

    let work = tempdir().unwrap();
    let home = tempdir().unwrap();
    let credentials = home.path().join("credentials.json");

    cargo_bin_cmd!("mur")
        .current_dir(work.path())
        .env("MURMURRC_PATH", home.path().join(".murmurrc"))
        .env("MUR_CREDENTIALS_PATH", &credentials)
        .env("MURMUR_SERVER_URL", server.base_url())
        .args(["login", "-u", "ada", "-p", "wrong"])
        .assert()
        .code(1)
        .stderr(contains("[502]"));
    assert!(!credentials.exists());
}
