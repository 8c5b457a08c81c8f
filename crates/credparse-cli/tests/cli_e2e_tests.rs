//! End-to-end tests for the credparse binary
//!
//! These tests run the real binary against temporary dump files and check:
//! - Console and file output
//! - Delimiter resolution modes
//! - Exit status for failed files and bad arguments

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn credparse() -> Command {
    let mut cmd = Command::cargo_bin("credparse").unwrap();
    cmd.env_remove("LOG_LEVEL")
        .env_remove("LOG_OUTPUT")
        .env_remove("RUST_LOG")
        .arg("--no-progress");
    cmd
}

fn write_input(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Console Output
// ============================================================================

#[test]
fn test_console_output() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dump.txt", b"alice:hunter2\njunk\nbob:pa:ss\n");

    credparse()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Output 1] alice, hunter2"))
        .stdout(predicate::str::contains("[Output 2] bob, pa:ss"))
        .stdout(predicate::str::contains("junk").not())
        .stderr(predicate::str::contains(
            "[Error 1] Couldn't determine delimiter, junk",
        ))
        .stderr(predicate::str::contains("2 records written, 1 lines failed to parse"));
}

#[test]
fn test_lowest_index_mode() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dump.txt", b"a;b:c\n");

    credparse()
        .arg(&input)
        .args(["-m", "LOWEST_INDEX"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Output 1] a, b:c"));

    credparse()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Output 1] a;b, c"));
}

// ============================================================================
// File Output
// ============================================================================

#[test]
fn test_file_output() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_input(dir.path(), "combo.txt", b"alice|x\nbob|y|z\nnope\n");

    credparse()
        .arg(&input)
        .args(["-s", "\\x7c", "-o", "file", "--errors", "file", "--out-delimiter", ","])
        .arg("--output-dir")
        .arg(out.path())
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(out.path().join("combo_parsed.txt")).unwrap(),
        "alice,x\nbob,y|z\n"
    );
    assert_eq!(
        std::fs::read_to_string(out.path().join("combo_errors.txt")).unwrap(),
        "nope\n"
    );
}

// ============================================================================
// Error Handling
// ============================================================================

#[test]
fn test_missing_file_fails_run_but_processes_others() {
    let dir = TempDir::new().unwrap();
    let good = write_input(dir.path(), "good.txt", b"a:b\n");

    credparse()
        .arg(dir.path().join("missing.txt"))
        .arg(&good)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[Output 1] a, b"))
        .stderr(predicate::str::contains("missing.txt: failed:"));
}

#[test]
fn test_invalid_field_count_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dump.txt", b"a:b\n");

    credparse()
        .arg(&input)
        .args(["-n", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Field count must be at least 2"));
}

#[test]
fn test_database_output_requires_table() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dump.txt", b"a:b\n");

    credparse()
        .env_remove("CREDPARSE_DB_TABLE")
        .arg(&input)
        .args(["-o", "database", "-d", "leaks"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--table is required"));
}

#[test]
fn test_markdown_help() {
    Command::cargo_bin("credparse")
        .unwrap()
        .arg("--markdown-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--delimiters"));
}
