//! Tests for the `rewind` command line

use super::common::{rewind_command, write_config};
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    rewind_command(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("downgrade"))
        .stdout(predicate::str::contains("versions"))
        .stdout(predicate::str::contains("login"));
}

#[test]
fn test_config_path_follows_rewind_home() {
    let home = TempDir::new().unwrap();
    rewind_command(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"))
        .stdout(predicate::str::contains(home.path().to_string_lossy().as_ref()));
}

#[test]
fn test_config_show_writes_defaults() {
    let home = TempDir::new().unwrap();
    rewind_command(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delivery_port: 9090"))
        .stdout(predicate::str::contains("genPlist"));
    assert!(home.path().join("config.yaml").exists());
}

#[test]
fn test_invalid_config_is_reported_with_hint() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "delivery_host: 0.0.0.0\n");
    rewind_command(home.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loopback"))
        .stderr(predicate::str::contains("hint"));
}

#[test]
fn test_bad_share_link_fails() {
    let home = TempDir::new().unwrap();
    rewind_command(home.path())
        .args(["versions", "https://example.com/nothing-here", "--history"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid share link"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_versions_from_history_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/123456789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"external_identifier": 850, "bundle_version": "2.0.0"},
                {"external_identifier": "700", "bundle_version": "1.9.0"}
            ]
        })))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    write_config(home.path(), &format!("history_url: {}/history\n", server.uri()));

    rewind_command(home.path())
        .args(["versions", "https://apps.apple.com/us/app/demo/id123456789", "--history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("850"))
        .stdout(predicate::str::contains("2.0.0"))
        .stdout(predicate::str::contains("1.9.0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_versions_unknown_app_suggests_other_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    write_config(home.path(), &format!("history_url: {}/history\n", server.uri()));

    rewind_command(home.path())
        .args(["versions", "42", "--history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No releases"))
        .stdout(predicate::str::contains("without --history"));
}
