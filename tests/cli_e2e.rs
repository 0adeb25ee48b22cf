//! End-to-end CLI tests for the forms binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A `forms` command isolated from the user's config and password.
fn forms(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("forms").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env_remove("FORMS_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("forms platform server"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("forms"));
}

/// Test that a subcommand is required.
#[test]
fn test_binary_without_subcommand_fails() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .args(["--invalid-flag", "session-key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that session-key prints a number without any server settings.
#[test]
fn test_session_key_prints_token() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .args(["-q", "session-key"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^-?\d+\n$").unwrap());
}

/// Test that a server command without a host names the missing setting.
#[test]
fn test_missing_host_is_reported() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .args(["list", "app1", "F_Form1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("host"));
}

/// Test that a malformed filter is rejected before connecting.
#[test]
fn test_bad_filter_is_rejected() {
    let home = TempDir::new().expect("Failed to create temp dir");
    forms(&home)
        .args([
            "list", "app1", "F_Form1", "--host", "http://127.0.0.1:9", "-u", "admin", "-f",
            "F_Name:like:x",
        ])
        .env("FORMS_PASSWORD", "secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid filter"));
}

/// Test that a password in the config file is refused.
#[test]
fn test_config_file_password_is_refused() {
    let home = TempDir::new().expect("Failed to create temp dir");
    let config = home.path().join("forms.toml");
    std::fs::write(&config, "host = \"http://h\"\npassword = \"hunter2\"\n").unwrap();

    forms(&home)
        .arg("--config")
        .arg(&config)
        .args(["start", "a1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FORMS_PASSWORD"));
}

/// Test that start talks to the server using config-file defaults.
#[tokio::test(flavor = "multi_thread")]
async fn test_start_uses_config_file_and_prints_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/forms/secure/org/app/a1/deployed/latest"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let home = TempDir::new().expect("Failed to create temp dir");
    let config_dir = home.path().join("forms-client");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        format!(
            "host = \"{}\"\ncontext = \"forms\"\nusername = \"admin\"\n",
            server.uri()
        ),
    )
    .unwrap();

    let mut cmd = forms(&home);
    cmd.args(["start", "a1"]).env("FORMS_PASSWORD", "secret");
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert
        .success()
        .stdout(predicate::str::contains("\"http_status\": 200"));
}

/// Test that a non-success status makes the command fail.
#[tokio::test(flavor = "multi_thread")]
async fn test_failed_request_exits_non_zero() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let home = TempDir::new().expect("Failed to create temp dir");
    let mut cmd = forms(&home);
    cmd.args(["delete", "app1", "F_Form1", "r1", "--context", "forms", "-u", "admin"])
        .arg("--host")
        .arg(server.uri())
        .env("FORMS_PASSWORD", "secret");
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert
        .failure()
        .stdout(predicate::str::contains("\"http_status\": 404"))
        .stderr(predicate::str::contains("HTTP 404"));
}
