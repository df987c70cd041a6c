//! Integration tests for the conveyor CLI
//!
//! These tests run the actual binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get the binary to test
fn conveyor_cmd() -> Command {
    Command::cargo_bin("conveyor").unwrap()
}

/// Write `parts` as part1.txt, part2.txt, ... and return their paths
fn write_parts(dir: &TempDir, parts: &[&str]) -> Vec<PathBuf> {
    parts
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let path = dir.path().join(format!("part{}.txt", i + 1));
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_help_flag() {
    conveyor_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Stream files one at a time into a single reusable output",
        ));
}

#[test]
fn test_cat_help() {
    conveyor_cmd()
        .args(["cat", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--reverse"))
        .stdout(predicate::str::contains("--max"))
        .stdout(predicate::str::contains("--events"))
        .stdout(predicate::str::contains("always releases the queue"));
}

// ============================================================================
// cat
// ============================================================================

#[test]
fn test_cat_to_stdout_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["A", "B", "C"]);

    conveyor_cmd()
        .arg("cat")
        .args(&files)
        .assert()
        .success()
        .stdout("ABC")
        .stderr(predicate::str::contains("3 file(s), 3 bytes"));
}

#[test]
fn test_cat_to_output_file() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["Hello", ", ", "World"]);
    let output = temp_dir.path().join("joined.txt");

    conveyor_cmd()
        .arg("cat")
        .args(&files)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(fs::read_to_string(&output).unwrap(), "Hello, World");
}

#[test]
fn test_cat_reverse() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["1", "2", "3", "4"]);

    conveyor_cmd()
        .arg("cat")
        .arg("--reverse")
        .args(&files)
        .assert()
        .success()
        .stdout("4321");
}

#[test]
fn test_cat_max_skips_extra_files() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["a", "b", "c"]);

    // Paused start so nothing leaves the queue while files are added
    let config = temp_dir.path().join("opts.yaml");
    fs::write(&config, "start_paused: true\n").unwrap();

    conveyor_cmd()
        .arg("cat")
        .args(["--max", "2", "--config"])
        .arg(&config)
        .args(&files)
        .assert()
        .success()
        .stdout("ab")
        .stderr(predicate::str::contains("skipped"))
        .stderr(predicate::str::contains("part3.txt"));
}

#[test]
fn test_cat_releases_paused_config() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["x", "y"]);
    let config = temp_dir.path().join("opts.yaml");
    fs::write(&config, "start_paused: true\n").unwrap();

    conveyor_cmd()
        .arg("cat")
        .arg("--config")
        .arg(&config)
        .args(&files)
        .assert()
        .success()
        .stdout("xy");
}

#[test]
fn test_cat_events_json() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["x"]);

    conveyor_cmd()
        .arg("cat")
        .arg("--events")
        .args(&files)
        .assert()
        .success()
        .stderr(predicate::str::contains("segment_settled"))
        .stderr(predicate::str::contains("conveyor_ended"));
}

#[test]
fn test_cat_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let files = write_parts(&temp_dir, &["present"]);

    conveyor_cmd()
        .arg("cat")
        .args(&files)
        .arg(temp_dir.path().join("missing.txt"))
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("CONV-022"))
        .stderr(predicate::str::contains("missing.txt"));
}

#[test]
fn test_cat_requires_files() {
    conveyor_cmd().arg("cat").assert().failure();
}

// ============================================================================
// check
// ============================================================================

#[test]
fn test_check_valid_options() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("opts.yaml");
    fs::write(&config, "max: 4\nstart_paused: false\n").unwrap();

    conveyor_cmd()
        .arg("check")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Max queued: 4"));
}

#[test]
fn test_check_unknown_key() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("opts.yaml");
    fs::write(&config, "maximum: 4\n").unwrap();

    conveyor_cmd()
        .arg("check")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONV-021"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_check_missing_file() {
    conveyor_cmd()
        .args(["check", "/nonexistent/opts.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}
