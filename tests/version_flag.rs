use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("booru-view")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("booru-view")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("booru-view"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("/post/<id>/edit"));
}

#[test]
fn missing_target_is_a_usage_error() {
    Command::cargo_bin("booru-view")
        .unwrap()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing target post"));
}

#[test]
fn malformed_route_is_rejected() {
    Command::cargo_bin("booru-view")
        .unwrap()
        .arg("/post/abc")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid post id: abc"));
}

#[test]
fn save_credentials_writes_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    Command::cargo_bin("booru-view")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["--save-credentials", "alice", "secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved credentials"));
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("alice"));
    assert!(written.contains("secret"));
}
