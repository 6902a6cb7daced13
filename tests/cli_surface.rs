//! CLI surface tests: argument validation happens before any tunnel or port
//! is touched, so these run without a cluster.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_all_operations() {
    let mut cmd = Command::cargo_bin("podprof").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cpu"))
        .stdout(predicate::str::contains("heap"))
        .stdout(predicate::str::contains("goroutine"))
        .stdout(predicate::str::contains("flamegraph"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn unknown_profile_type_is_rejected_at_the_cli() {
    let mut cmd = Command::cargo_bin("podprof").unwrap();
    cmd.args(["profile", "app-1", "--type", "speed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn missing_pod_argument_is_rejected() {
    let mut cmd = Command::cargo_bin("podprof").unwrap();
    cmd.arg("cpu").assert().failure();
}

#[test]
fn version_flag_works() {
    let mut cmd = Command::cargo_bin("podprof").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
