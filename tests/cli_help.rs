use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn cli_help_runs() {
    let mut cmd = Command::cargo_bin("svo2extract").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("intrinsics"));
}

#[test]
fn intrinsics_requires_mode_or_height() {
    let mut cmd = Command::cargo_bin("svo2extract").unwrap();
    cmd.args(["intrinsics", "SN1.conf"]).assert().failure();
}
