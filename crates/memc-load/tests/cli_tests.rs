//! End-to-end tests for the memc-load binary
//!
//! These tests run the compiled binary and cover:
//! - Self-test mode
//! - Dry runs over a real input directory
//! - Option validation and defaults
//! - File logging

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use flate2::write::GzEncoder;
use flate2::Compression;
use predicates::prelude::*;
use std::io::Write;
use tempfile::TempDir;

const LOG_VARS: [&str; 6] = [
    "MEMC_LOG_LEVEL",
    "MEMC_LOG_OUTPUT",
    "MEMC_LOG_FORMAT",
    "MEMC_LOG_FILE",
    "MEMC_LOG_FILTER",
    "MEMC_LOG_THREAD_IDS",
];

fn memc_load() -> Command {
    let mut cmd = Command::cargo_bin("memc-load").unwrap();
    for var in LOG_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_gz(dir: &TempDir, name: &str, lines: &[&str]) {
    let file = std::fs::File::create(dir.path().join(name)).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    for line in lines {
        writeln!(encoder, "{}", line).unwrap();
    }
    encoder.finish().unwrap();
}

#[test]
fn test_self_test_succeeds() {
    memc_load()
        .arg("--test")
        .assert()
        .success()
        .stdout(predicate::str::contains("Self-test passed"));
}

#[test]
fn test_dry_run_loads_and_renames() {
    let dir = TempDir::new().unwrap();
    write_gz(
        &dir,
        "20170929000000.tsv.gz",
        &[
            "idfa\te7e1a50c0ec2747ca56cd9e1558c0d7c\t67.7835424444\t-22.8044005471\t7942,8519",
            "gaid\t3261cf44cbe6a00839c574336fdf49f6\t137.790839567\t56.8403675248\t7462,1115",
        ],
    );

    memc_load()
        .arg("--dry")
        .arg("--pattern")
        .arg(format!("{}/*.tsv.gz", dir.path().display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("Renamed"));

    assert!(dir.path().join(".20170929000000.tsv.gz").exists());
}

#[test]
fn test_zero_workers_is_rejected() {
    let dir = TempDir::new().unwrap();
    memc_load()
        .arg("--workers")
        .arg("0")
        .arg("--pattern")
        .arg(format!("{}/*.tsv.gz", dir.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be greater than 0"));
}

#[test]
fn test_log_option_writes_file() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("logs/memc.log");

    memc_load()
        .arg("--test")
        .arg("--log")
        .arg(&log)
        .assert()
        .success();

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Self-test passed"));
}

#[test]
fn test_help_shows_default_store_addresses() {
    memc_load()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1:33013"))
        .stdout(predicate::str::contains("127.0.0.1:33016"));
}
