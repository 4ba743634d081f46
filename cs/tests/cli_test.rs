//! End-to-end tests for the `cs` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cs(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cs").expect("cs binary should build");
    cmd.arg("--store").arg(temp.path().join("store.db"));
    cmd
}

#[test]
fn test_set_get_ls_rm() {
    let temp = TempDir::new().unwrap();

    cs(&temp).args(["set", "/state/svc-a", "{\"serviceId\":\"svc-a\"}"]).assert().success();

    cs(&temp)
        .args(["get", "/state/svc-a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("svc-a"));

    cs(&temp)
        .args(["ls", "/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state"));

    cs(&temp)
        .args(["stat", "/state"])
        .assert()
        .success()
        .stdout(predicate::str::contains("children: 1"));

    cs(&temp).args(["rm", "-r", "/state"]).assert().success();

    cs(&temp).args(["get", "/state/svc-a"]).assert().failure();
}

#[test]
fn test_tree_lists_nested_nodes() {
    let temp = TempDir::new().unwrap();

    cs(&temp).args(["set", "/request/r1/status", "\"PENDING\""]).assert().success();

    cs(&temp)
        .args(["tree", "/request"])
        .assert()
        .success()
        .stdout(predicate::str::contains("r1").and(predicate::str::contains("status")));
}

#[test]
fn test_invalid_path_fails() {
    let temp = TempDir::new().unwrap();
    cs(&temp).args(["get", "no-leading-slash"]).assert().failure();
}
