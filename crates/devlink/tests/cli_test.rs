//! Integration tests for the `devlink` CLI binary.
//!
//! These exercise argument parsing, config and identity handling, and
//! error exit codes without a command server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// A `devlink` command whose config and data dirs live under `home`.
fn devlink_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("devlink");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("DEVLINK_CONFIG")
        .env_remove("DEVLINK_SERVER__URL")
        .env_remove("DEVLINK_LINK__TRIGGER_PHRASE");
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("devlink.toml");
    std::fs::write(&path, body).unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = devlink_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("command server")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("identity"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("devlink"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .arg("frobnicate")
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("devlink"));
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Identity ────────────────────────────────────────────────────────

#[test]
fn test_identity_set_then_show() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .args(["identity", "set", "042"])
        .assert()
        .success()
        .stderr(predicate::str::contains("042"));

    devlink_cmd(home.path())
        .args(["identity", "show"])
        .assert()
        .success()
        .stdout("042\n");
}

#[test]
fn test_identity_dir_from_config() {
    let home = TempDir::new().unwrap();
    let state = home.path().join("state");
    let config = write_config(
        &home,
        &format!("[identity]\ndir = {:?}\n", state.display().to_string()),
    );

    devlink_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["identity", "set", "314"])
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(state.join("device_number.txt")).unwrap(),
        "314"
    );
    assert!(state.join("identity.toml").exists());
}

#[test]
fn test_identity_set_rejects_bad_code() {
    let home = TempDir::new().unwrap();
    for bad in ["42", "4200", "abc"] {
        devlink_cmd(home.path())
            .args(["identity", "set", bad])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("not a valid device code"));
    }
}

#[test]
fn test_identity_show_without_code() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .args(["identity", "show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No device code"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("custom.toml");
    devlink_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_merges_file_env_and_flags() {
    let home = TempDir::new().unwrap();
    let config = write_config(
        &home,
        "[server]\nurl = \"ws://10.0.0.9:9000\"\n\n[link]\nheartbeat_interval_secs = 10\n",
    );

    devlink_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .env("DEVLINK_LINK__TRIGGER_PHRASE", "switch now")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ws://10.0.0.9:9000")
                .and(predicate::str::contains("heartbeat_interval_secs = 10"))
                .and(predicate::str::contains("switch now")),
        );

    devlink_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--server", "wss://relay.example.com", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wss://relay.example.com"));
}

#[test]
fn test_config_show_invalid_file() {
    let home = TempDir::new().unwrap();
    let config = write_config(&home, "[link]\nheartbeat_interval_secs = \"soon\"\n");
    devlink_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .code(1);
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_without_identity() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("identity set"));
}

#[test]
fn test_run_rejects_non_websocket_server() {
    let home = TempDir::new().unwrap();
    devlink_cmd(home.path())
        .args(["--server", "http://10.0.0.5", "run", "--device", "042"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("server.url"));
}
