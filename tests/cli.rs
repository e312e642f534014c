use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_config(tool: &str, allow: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let allow = allow
        .iter()
        .map(|e| format!("\"{e}\""))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(file, "tool = \"{tool}\"").unwrap();
    writeln!(file, "allow_list = [{allow}]").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("vaultkeeper").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vaultkeeper 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("vaultkeeper").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Secure command-execution gateway for the Azure CLI",
        ));
}

#[test]
fn test_cli_run_missing_command() {
    let mut cmd = Command::cargo_bin("vaultkeeper").unwrap();
    cmd.arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_run_allow_listed_command() {
    let config = write_config("echo", &["echo"]);
    let mut cmd = Command::cargo_bin("vaultkeeper").unwrap();
    cmd.arg("--config")
        .arg(config.path())
        .arg("run")
        .arg("echo gateway-ok")
        .assert()
        .success()
        .stdout(predicate::str::contains("gateway-ok"));
}

#[test]
fn test_cli_run_rejects_injection() {
    let config = write_config("echo", &["echo"]);
    let mut cmd = Command::cargo_bin("vaultkeeper").unwrap();
    cmd.arg("--config")
        .arg(config.path())
        .arg("run")
        .arg("echo hi; rm -rf /")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dangerous"));
}

#[test]
fn test_cli_check_reports_missing_tool() {
    let config = write_config(
        "vaultkeeper-no-such-tool",
        &["vaultkeeper-no-such-tool list"],
    );
    let mut cmd = Command::cargo_bin("vaultkeeper").unwrap();
    cmd.arg("--config")
        .arg(config.path())
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}
