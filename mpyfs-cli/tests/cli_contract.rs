//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("mpy").expect("binary should build")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mpy"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mpy"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn no_arguments_is_a_usage_error() {
    let mut cmd = cli_cmd();
    cmd.assert().failure().code(2);
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let mut cmd = cli_cmd();
    cmd.arg("frobnicate").assert().failure().code(2);
}

#[test]
fn list_ports_json_returns_valid_json() {
    // In environments without serial ports this still exercises the
    // JSON machinery end to end.
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: serde_json::Value =
            serde_json::from_str(&stdout).expect("output should be valid JSON");
        assert!(parsed.is_array());
    }
}

#[test]
fn restore_missing_image_is_a_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("not_exists.bin");

    let mut cmd = cli_cmd();
    cmd.arg("restore")
        .arg(&missing)
        .arg("--yes")
        .env("MPY_NON_INTERACTIVE", "1")
        .env("MPY_PORT", "/dev/null")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exec_missing_local_file_fails_before_touching_a_port() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("absent.py");

    let mut cmd = cli_cmd();
    cmd.arg("exec")
        .arg(&missing)
        .env("MPY_PORT", "/dev/null")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn completions_bash_writes_script_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mpy"));
}

#[test]
fn check_firmware_without_record_is_a_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let empty_config = dir.path().join("empty.toml");
    std::fs::write(&empty_config, "").expect("config should be written");

    let mut cmd = cli_cmd();
    cmd.arg("--config")
        .arg(&empty_config)
        .arg("check-firmware")
        .env("MPY_PORT", "/dev/null")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("firmware"));
}
