//! CLI-level smoke tests for the network-free surfaces.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn status_works_against_an_empty_state_root() {
    let tmp = TempDir::new().unwrap();
    Command::cargo_bin("outpost")
        .unwrap()
        .env("OUTPOST_HOME", tmp.path())
        // Keep the test hermetic: no detached background check.
        .env("OUTPOST_UPDATE_DISABLED", "1")
        .args(["update", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version:"))
        .stdout(predicate::str::contains("never"))
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn rollback_to_a_missing_version_fails_loudly() {
    let tmp = TempDir::new().unwrap();
    Command::cargo_bin("outpost")
        .unwrap()
        .env("OUTPOST_HOME", tmp.path())
        .args(["update", "--rollback", "9.9.9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rollback"));
}

#[test]
fn rollback_conflicts_with_check() {
    let tmp = TempDir::new().unwrap();
    Command::cargo_bin("outpost")
        .unwrap()
        .env("OUTPOST_HOME", tmp.path())
        .args(["update", "--rollback", "1.0.0", "--check"])
        .assert()
        .failure();
}
