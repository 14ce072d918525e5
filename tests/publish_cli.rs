use std::fs;
use std::io::Write;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use httpmock::prelude::*;
use predicates::str::contains;
use serde_json::json;
use tempfile::{TempDir, tempdir};

const INIT_RC: &str = "[murmur-nexus]\n\
index-url = https://artifacts.murmur.nexus/simple\n\
extra-index-url = https://pypi.org/simple\n";
const MANIFEST: &str = "name: planner\nversion: 1.0.0\ntype: agent\ndescription: Plans things\n";

fn write_wheel(path: &Path, version: &str) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file(
        "ada_planner-1.0.0.dist-info/METADATA",
        zip::write::SimpleFileOptions::default(),
    )
    .unwrap();
    write!(zip, "Metadata-Version: 2.3\nName: ada.planner\nVersion: {version}\n").unwrap();
    zip.finish().unwrap();
}

struct Workspace {
    work: TempDir,
    home: TempDir,
}

impl Workspace {
    fn new(wheel_version: &str) -> Self {
        let workspace = Self::without_rc(wheel_version);
        fs::write(workspace.work.path().join(".murmurrc"), INIT_RC).unwrap();
        workspace
    }

    fn without_rc(wheel_version: &str) -> Self {
        let work = tempdir().unwrap();
        let home = tempdir().unwrap();
        fs::write(work.path().join("murmur-build.yaml"), MANIFEST).unwrap();
        fs::write(
            home.path().join("credentials.json"),
            json!({ "username": "ada", "access_token": "tok-123" }).to_string(),
        )
        .unwrap();
        let dist = work.path().join("planner/dist");
        fs::create_dir_all(&dist).unwrap();
        write_wheel(&dist.join("ada_planner-1.0.0-py3-none-any.whl"), wheel_version);
        Self { work, home }
    }

    fn global_rc(&self) -> std::path::PathBuf {
        self.home.path().join(".murmurrc")
    }

    fn publish(&self, server: &MockServer) -> assert_cmd::assert::Assert {
        self.publish_with_token(server, None)
    }

    fn publish_with_token(
        &self,
        server: &MockServer,
        token: Option<&str>,
    ) -> assert_cmd::assert::Assert {
        let mut cmd = cargo_bin_cmd!("mur");
        cmd.current_dir(self.work.path())
            .env("MURMURRC_PATH", self.global_rc())
            .env("MUR_CREDENTIALS_PATH", self.home.path().join("credentials.json"))
            .env("MURMUR_SERVER_URL", server.base_url());
        match token {
            Some(token) => cmd.env("MUR_TOKEN", token),
            None => cmd.env_remove("MUR_TOKEN"),
        };
        cmd.arg("publish").assert()
    }
}

#[test]
fn publishes_and_uploads_wheel() {
    let server = MockServer::start();
    let publish = server.mock(|when, then| {
        when.method(POST)
            .path("/artifacts")
            .header("authorization", "Bearer tok-123");
        then.status(200).json_body(json!({
            "status": "pending",
            "signed_upload_urls": [
                { "file_type": "wheel", "signed_url": server.url("/upload/wheel") }
            ]
        }));
    });
    let upload = server.mock(|when, then| {
        when.method(PUT)
            .path("/upload/wheel")
            .header("content-type", "application/octet-stream");
        then.status(200);
    });

    Workspace::new("1.0.0")
        .publish(&server)
        .success()
        .stdout(contains("Successfully published agent planner 1.0.0"));
    publish.assert();
    upload.assert();
}

#[test]
fn existing_version_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/artifacts");
        then.status(400)
            .body("The package or file already exists in the feed");
    });

    Workspace::new("1.0.0")
        .publish(&server)
        .code(1)
        .stderr(contains("[302]"));
}

#[test]
fn stale_wheel_is_not_sent() {
    let server = MockServer::start();
    let publish = server.mock(|when, then| {
        when.method(POST).path("/artifacts");
        then.status(200).json_body(json!({ "signed_upload_urls": [] }));
    });

    Workspace::new("0.9.0")
        .publish(&server)
        .code(1)
        .stderr(contains("[214]"));
    publish.assert_calls(0);
}

fn accept_wheel<'a>(server: &'a MockServer, bearer: &str) -> (httpmock::Mock<'a>, httpmock::Mock<'a>) {
    let publish = server.mock(|when, then| {
        when.method(POST)
            .path("/artifacts")
            .header("authorization", format!("Bearer {bearer}"));
        then.status(200).json_body(json!({
            "status": "pending",
            "signed_upload_urls": [
                { "file_type": "wheel", "signed_url": server.url("/upload/wheel") }
            ]
        }));
    });
    let upload = server.mock(|when, then| {
        when.method(PUT).path("/upload/wheel");
        then.status(200);
    });
    (publish, upload)
}

#[test]
fn env_token_overrides_stored_credentials() {
    let server = MockServer::start();
    let (publish, upload) = accept_wheel(&server, "env-tok");

    Workspace::new("1.0.0")
        .publish_with_token(&server, Some("env-tok"))
        .success();
    publish.assert();
    upload.assert();
}

#[test]
fn first_publish_writes_default_global_rc() {
    let server = MockServer::start();
    let (publish, _upload) = accept_wheel(&server, "tok-123");

    let workspace = Workspace::without_rc("1.0.0");
    assert!(!workspace.global_rc().exists());
    workspace.publish(&server).success();
    publish.assert();

    let written = fs::read_to_string(workspace.global_rc()).unwrap();
    assert!(written.contains("[murmur-nexus]"));
    assert!(written.contains("index-url = https://artifacts.murmur.nexus/simple"));
    assert!(written.contains("extra-index-url = https://pypi.org/simple"));
    assert!(!workspace.work.path().join(".murmurrc").exists());
}
