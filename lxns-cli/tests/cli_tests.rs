use assert_cmd::Command;
use predicates::prelude::*;
use std::ffi::OsStr;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;

const SENTINEL: &str = "@lxns:ns-instance@";

fn lxns() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lxns"))
}

fn config_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

fn host_uid() -> u32 {
    unsafe { libc::getuid() }
}

#[test]
fn test_help_command() {
    lxns()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run a program in new Linux namespaces"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--network-helper"))
        .stdout(predicate::str::contains("--ipaddr"))
        .stdout(predicate::str::contains("--rootfs"))
        .stdout(predicate::str::contains("--id"));
}

#[test]
fn test_version_command() {
    lxns()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lxns"));
}

#[test]
fn test_missing_command() {
    lxns()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_malformed_config() {
    let file = config_file(r#"{"Features": ["uts""#);

    lxns()
        .arg("--config")
        .arg(file.path())
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_missing_config_file() {
    lxns()
        .args(["--config", "/nonexistent/lxns.json", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/lxns.json"));
}

#[test]
fn test_unrecognized_feature() {
    let file = config_file(r#"{"Features": ["uts", "cgroup"]}"#);

    lxns()
        .arg("-c")
        .arg(file.path())
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("`cgroup`"));
}

#[test]
fn test_invalid_ipaddr() {
    lxns()
        .args(["--ipaddr", "10.0.0.300/24", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_relative_rootfs() {
    lxns()
        .args(["--rootfs", "srv/root", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absolute"));
}

#[test]
fn test_non_utf8_rootfs_rejected_before_launch() {
    lxns()
        .arg("--rootfs")
        .arg(OsStr::from_bytes(b"/srv/root\xff"))
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("UTF-8"));
}

#[test]
fn test_overlong_id_rejected_before_launch() {
    lxns()
        .arg("--id")
        .arg("x".repeat(60))
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("too long"));
}

#[test]
fn test_setup_role_without_control_channel() {
    let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_lxns"));
    cmd.arg0(SENTINEL).arg("true");
    unsafe {
        cmd.pre_exec(|| {
            libc::close(3);
            Ok(())
        });
    }

    Command::from_std(cmd)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("descriptor 3 is not open"));
}

#[test]
#[ignore] // Requires unprivileged user namespaces
fn test_uts_hostname() {
    let file = config_file(r#"{"Features": ["user", "uts"], "Id": "abc123"}"#);

    lxns()
        .arg("-c")
        .arg(file.path())
        .arg("hostname")
        .assert()
        .success()
        .stdout(predicate::str::contains("lxns-abc123"));
}

#[test]
#[ignore] // Requires root
fn test_uts_hostname_as_root() {
    let file = config_file(r#"{"Features": ["uts"]}"#);

    lxns()
        .env("RUST_LOG", "warn")
        .args(["--id", "abc123"])
        .arg("-c")
        .arg(file.path())
        .arg("hostname")
        .assert()
        .success()
        .stdout(predicate::str::contains("lxns-abc123"));
}

#[test]
#[ignore] // Requires unprivileged user namespaces
fn test_user_mapping() {
    let uid = host_uid();
    let mapping = format!(r#"{{"ContainerId": 0, "HostId": {uid}, "Size": 1}}"#);
    let file = config_file(&format!(r#"{{"Features": ["user"], "UidMappings": [{mapping}]}}"#));

    lxns()
        .arg("-c")
        .arg(file.path())
        .args(["id", "-u"])
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
#[ignore] // Requires unprivileged user namespaces
fn test_exit_code_propagated() {
    let file = config_file(r#"{"Features": ["user", "pid", "ns"]}"#);

    lxns()
        .arg("-c")
        .arg(file.path())
        .args(["sh", "-c", "exit 5"])
        .assert()
        .code(5);
}

#[test]
#[ignore] // Requires unprivileged user namespaces
fn test_attacher_failure() {
    let file = config_file(r#"{"Features": ["user", "net"]}"#);

    lxns()
        .arg("-c")
        .arg(file.path())
        .args(["--network-helper", "/bin/false", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Network attach error"));
}
