//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use predicates::prelude::*;

use common::controller_cmd;

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    controller_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("CNC Controller"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    controller_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cnc-controller"))
        .stdout(predicate::str::contains("target:"))
        .stdout(predicate::str::contains("rustc:"));
}

#[test]
fn test_short_version_flag() {
    controller_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cnc-controller"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_validate_nonexistent_file() {
    controller_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .assert()
        .code(10)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_init_help() {
    controller_cmd()
        .arg("config")
        .arg("init")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialize"))
        .stdout(predicate::str::contains("--path"))
        .stdout(predicate::str::contains("--force"));
}

// ─────────────────────────────────────────────────────────────────
// Run and Plan Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_help() {
    controller_cmd()
        .arg("run")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--job"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn test_run_requires_job() {
    controller_cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--job"));
}

#[test]
fn test_run_with_missing_config() {
    controller_cmd()
        .arg("run")
        .arg("--job")
        .arg("job.json")
        .arg("--config")
        .arg("/nonexistent/config.toml")
        .assert()
        .code(10);
}

#[test]
fn test_plan_help() {
    controller_cmd()
        .arg("plan")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("motion plan"));
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    controller_cmd().arg("-v").arg("version").assert().success();
}

#[test]
fn test_very_verbose_flag() {
    controller_cmd().arg("-vv").arg("version").assert().success();
}

#[test]
fn test_quiet_flag() {
    controller_cmd().arg("--quiet").arg("version").assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    controller_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    controller_cmd().assert().failure();
}
