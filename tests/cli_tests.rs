//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

use common::ConfigFixture;

/// Get a command for the eliza-daemon binary
fn daemon_cmd() -> Command {
    let mut cmd = Command::cargo_bin("eliza-daemon").unwrap();
    cmd.env_remove("ELIZA_CONFIG").env_remove("ELIZA_DATA_DIR");
    cmd
}

/// A command whose document store lives in the fixture's temp directory
fn isolated_cmd(fixture: &ConfigFixture) -> Command {
    let mut cmd = daemon_cmd();
    cmd.env("ELIZA_DATA_DIR", fixture.data_dir());
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    daemon_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Eliza Daemon"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("persona"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    daemon_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("eliza-daemon"))
        .stdout(predicate::str::contains("Build Information"))
        .stdout(predicate::str::contains("Git Hash"));
}

#[test]
fn test_short_version_flag() {
    daemon_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("eliza-daemon"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    daemon_cmd()
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("[daemon]"))
        .stdout(predicate::str::contains("[ledger]"))
        .stdout(predicate::str::contains("[reasoning]"))
        .stdout(predicate::str::contains("[storage]"));
}

#[test]
fn test_config_validate_default() {
    daemon_cmd()
        .arg("config")
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    daemon_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/daemon.toml")
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_validate_rejects_unknown_provider() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[reasoning]
provider = "skynet"
"#,
    );

    daemon_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("skynet"));
}

// ─────────────────────────────────────────────────────────────────
// Persona Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_persona_list_seeds_defaults() {
    let fixture = ConfigFixture::new();

    isolated_cmd(&fixture)
        .args(["persona", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alexandra_executive"))
        .stdout(predicate::str::contains("marcus_technical"))
        .stdout(predicate::str::contains("sofia_community"))
        .stdout(predicate::str::contains("david_compliance"));

    assert!(fixture.data_dir().exists());
}

#[test]
fn test_persona_suspend_persists() {
    let fixture = ConfigFixture::new();

    isolated_cmd(&fixture)
        .args(["persona", "suspend", "marcus_technical"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marcus_technical is now suspended"));

    isolated_cmd(&fixture)
        .args(["persona", "show", "marcus_technical"])
        .assert()
        .success()
        .stdout(predicate::str::contains("suspended"));
}

#[test]
fn test_persona_unknown_id() {
    let fixture = ConfigFixture::new();

    isolated_cmd(&fixture)
        .args(["persona", "activate", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

// ─────────────────────────────────────────────────────────────────
// History and Run Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_history_empty() {
    let fixture = ConfigFixture::new();

    isolated_cmd(&fixture)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No decisions recorded."));
}

#[test]
fn test_run_once_with_mock_reasoning() {
    let fixture = ConfigFixture::new();
    fixture.write_config(&format!(
        r#"
[daemon]
name = "cli-test"

[reasoning]
provider = "mock"

[storage]
data_dir = "{}"
"#,
        fixture.data_dir().display()
    ));

    daemon_cmd()
        .args(["--quiet", "run", "--once", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("**cli-test** cycle #1"));
}

#[test]
fn test_run_with_missing_config() {
    daemon_cmd()
        .args(["run", "--config", "/nonexistent/daemon.toml"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    daemon_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    daemon_cmd().assert().failure();
}
