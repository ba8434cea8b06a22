//! End-to-end tests for the `datavol exec` command.

#[allow(dead_code)]
mod common;
#[allow(unused_imports)]
use common::prelude::*;

use serial_test::serial;

#[test]
fn test_exec_requires_command() {
    let mut cmd = cargo_bin_cmd!("datavol");
    cmd.arg("exec").arg("ipfs").assert().code(2);
}

#[test]
fn test_exec_rejects_malformed_env() {
    let fixture = DataFixture::new();
    fixture
        .command()
        .arg("exec")
        .arg("ipfs")
        .arg("-e")
        .arg("NOEQUALS")
        .arg("--")
        .arg("ls")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[cfg(unix)]
#[test]
#[serial]
fn test_exec_missing_container_is_not_created() {
    let fixture = DataFixture::new();
    let log = fixture.path().join("engine.log");
    let engine = fake_engine(
        fixture.path(),
        &format!(r#"echo "$1" >> "{}""#, log.display()),
    );

    fixture
        .command()
        .arg("--engine")
        .arg(&engine)
        .arg("exec")
        .arg("ipfs")
        .arg("--")
        .arg("ls")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No data container eris_data_ipfs_1"));

    let recorded = std::fs::read_to_string(log).unwrap();
    assert_eq!(recorded.trim(), "ps");
}

#[cfg(unix)]
#[test]
#[serial]
fn test_exec_propagates_exit_status() {
    let fixture = DataFixture::new().with_definition("ipfs", definitions::FULL);
    let log = fixture.path().join("engine.log");
    let engine = fake_engine(
        fixture.path(),
        &format!(
            r#"echo "$@" >> "{}"
case "$1" in
  ps) echo 4f1c0e2a9b7d ;;
  run) exit 7 ;;
esac"#,
            log.display()
        ),
    );

    fixture
        .command()
        .arg("--engine")
        .arg(&engine)
        .arg("exec")
        .arg("ipfs")
        .arg("--user")
        .arg("root")
        .arg("--")
        .arg("ls")
        .arg("/data")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("exited with status 7"));

    let recorded = std::fs::read_to_string(log).unwrap();
    let run = recorded.lines().find(|l| l.starts_with("run")).unwrap();
    assert!(run.contains("--volumes-from 4f1c0e2a9b7d"));
    assert!(run.contains("--user root"));
    assert!(run.contains("--env IPFS_PATH=/home/eris/.eris/ipfs"));
    assert!(run.ends_with("eris/data:0.10 ls /data"));
}
