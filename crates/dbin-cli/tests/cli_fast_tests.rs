//! Fast CLI tests using assert_cmd.
//! These test the binary directly without needing a container runtime.

#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but works fine

use assert_cmd::Command;
use predicates::prelude::*;

/// A dbin command whose config points at a file that does not exist yet
fn dbin(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dbin").unwrap();
    cmd.env("DBIN_CONFIG", config_dir.path().join("config.toml"));
    cmd
}

#[test]
fn test_help_flag() {
    Command::cargo_bin("dbin")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Throwaway databases in containers"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("dbin")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbin"));
}

#[test]
fn test_subcommand_help() {
    for subcmd in &["start", "run", "list", "cleanup", "config"] {
        Command::cargo_bin("dbin")
            .unwrap()
            .args([subcmd, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("dbin")
        .unwrap()
        .arg("nonexistent-subcommand")
        .assert()
        .failure();
}

#[test]
fn test_start_requires_database() {
    Command::cargo_bin("dbin")
        .unwrap()
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE"));
}

#[test]
fn test_invalid_provider_rejected() {
    Command::cargo_bin("dbin")
        .unwrap()
        .args(["--provider", "lxc", "start", "redis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lxc"));
}

#[test]
fn test_invalid_port_rejected() {
    Command::cargo_bin("dbin")
        .unwrap()
        .args(["start", "redis", "--port", "70000"])
        .assert()
        .failure();
}

#[test]
fn test_list_shows_builtin_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    dbin(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("postgres"))
        .stdout(predicate::str::contains("redis"))
        .stdout(predicate::str::contains("tidb"))
        .stdout(predicate::str::contains("pd + tikv + tidb"));
}

#[test]
fn test_list_includes_configured_database() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        r#"
[databases.keydb]
description = "KeyDB cache"

[[databases.keydb.roles]]
name = "keydb"
image = "eqalpha/keydb:latest"
port = 6379

[databases.keydb.client]
type = "exec"
command = ["keydb-cli"]
"#,
    )
    .unwrap();

    dbin(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("keydb"))
        .stdout(predicate::str::contains("KeyDB cache"));
}

#[test]
fn test_config_shows_defaults_when_missing() {
    let tmp = tempfile::tempdir().unwrap();
    dbin(&tmp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("not created yet"))
        .stdout(predicate::str::contains("stop_timeout"));
}

#[test]
fn test_config_shows_existing_file() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        "[defaults]\nstop_timeout = 3\n",
    )
    .unwrap();

    dbin(&tmp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("stop_timeout = 3"));
}
