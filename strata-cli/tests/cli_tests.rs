//! Integration tests for the strata CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the strata binary
#[allow(deprecated)]
fn strata_cmd() -> Command {
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.env_remove("DATABASE_URL");
    cmd
}

fn config_arg(dir: &TempDir) -> String {
    dir.path().join("strata.toml").display().to_string()
}

#[test]
fn test_help_command() {
    strata_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("phase-aware schema migrations"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("scaffold"));
}

#[test]
fn test_version_flag() {
    strata_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strata"));
}

#[test]
fn test_apply_help_lists_phases() {
    strata_cmd()
        .args(["apply", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--phase"))
        .stdout(predicate::str::contains("expand"))
        .stdout(predicate::str::contains("contract"));
}

#[test]
fn test_apply_rejects_unknown_phase() {
    strata_cmd()
        .args(["apply", "--phase", "sideways"])
        .assert()
        .failure();
}

#[test]
fn test_rollback_count_conflicts_with_target() {
    strata_cmd()
        .args(["rollback", "2", "--to", "20260101000000-init"])
        .assert()
        .failure();
}

#[test]
fn test_generate_without_registered_schema_fails() {
    let dir = TempDir::new().unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "generate", "init"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no schema registered"));
}

#[test]
fn test_apply_without_database_url_fails() {
    let dir = TempDir::new().unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "apply"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no database URL"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("strata.toml"), "[database\nurl = ").unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_scaffold_writes_data_migration() {
    let dir = TempDir::new().unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "scaffold", "backfill_emails"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backfill_emails"));

    let data_dir = dir.path().join("migrations").join("data");
    let entries: Vec<_> = fs::read_dir(&data_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);

    let path = entries[0].as_ref().unwrap().path();
    let content = fs::read_to_string(path).unwrap();
    assert!(content.contains("phase = \"data\""));
    assert!(content.contains("scaffold = true"));
}

#[test]
fn test_scaffold_respects_configured_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("strata.toml"),
        "[migrations]\ndir = \"db/migrations\"\n",
    )
    .unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "scaffold", "backfill"])
        .assert()
        .success();

    assert!(dir.path().join("db/migrations/data").is_dir());
}

#[test]
fn test_scaffold_rejects_bad_name() {
    let dir = TempDir::new().unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "scaffold", "not a name"])
        .assert()
        .code(1);
}

#[test]
fn test_scaffold_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    strata_cmd()
        .args(["--config", &config_arg(&dir), "--dry-run", "scaffold", "backfill"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    assert!(!dir.path().join("migrations").exists());
}
