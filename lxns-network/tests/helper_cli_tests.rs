use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help() {
    Command::new(env!("CARGO_BIN_EXE_lxns-network-helper"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("<PID>"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--bridge").not());
}

#[test]
fn test_missing_pid() {
    Command::new(env!("CARGO_BIN_EXE_lxns-network-helper"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_non_numeric_pid() {
    Command::new(env!("CARGO_BIN_EXE_lxns-network-helper"))
        .arg("not-a-pid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_bridge_is_not_selectable() {
    Command::new(env!("CARGO_BIN_EXE_lxns-network-helper"))
        .args(["--bridge", "br-other", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_log_level_ignores_environment() {
    // Without -v nothing below info is printed, whatever RUST_LOG says.
    Command::new(env!("CARGO_BIN_EXE_lxns-network-helper"))
        .env("RUST_LOG", "trace")
        .arg("999999999")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DEBUG").not())
        .stderr(predicate::str::contains("TRACE").not());
}
