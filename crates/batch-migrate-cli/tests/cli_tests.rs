//! CLI integration tests for batch-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes for error conditions, and dry-run loads that need no database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Get a command for the batch-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("batch-migrate").unwrap()
}

/// Write a minimal valid configuration to a temp file.
fn config_file(writer_section: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  host: localhost").unwrap();
    writeln!(file, "  database: warehouse").unwrap();
    writeln!(file, "  user: loader").unwrap();
    writeln!(file, "  password: secret").unwrap();
    write!(file, "{}", writer_section).unwrap();
    file
}

fn input_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("validate-config"));
}

#[test]
fn test_load_subcommand_help() {
    cmd()
        .args(["load", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--write-limit"))
        .stdout(predicate::str::contains("--retry-limit"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("batch-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "validate-config"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate-config"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate-config"])
        .assert()
        .code(1);
}

#[test]
fn test_mutation_ceiling_above_bind_limit_exits_with_code_1() {
    let config = config_file("writer:\n  max_mutations: 70000\n");

    cmd()
        .args(["--config", config.path().to_str().unwrap(), "validate-config"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_mutations"));
}

#[test]
fn test_zero_write_limit_override_exits_with_code_1() {
    let config = config_file("");
    let input = input_file(&[]);

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "load",
            "--input",
            input.path().to_str().unwrap(),
            "--dry-run",
            "--write-limit",
            "0",
        ])
        .assert()
        .code(1);
}

#[test]
fn test_missing_input_exits_with_code_7() {
    let config = config_file("");

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "load",
            "--input",
            "nonexistent_rows.ndjson",
            "--dry-run",
        ])
        .assert()
        .code(7);
}

// =============================================================================
// Command Behavior Tests
// =============================================================================

#[test]
fn test_validate_config_shows_effective_settings() {
    let config = config_file("writer:\n  write_limit: 3\n  retry_limit: 50\n");

    cmd()
        .args(["--config", config.path().to_str().unwrap(), "validate-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Write limit: 3"))
        .stdout(predicate::str::contains("Retry limit: 50"));
}

#[test]
fn test_dry_run_load_reports_rows() {
    let config = config_file("");
    let input = input_file(&[
        r#"{"table": "users", "columns": ["id", "name"], "values": [1, "ann"]}"#,
        "",
        r#"{"table": "users", "row": {"id": 2, "name": "bob"}}"#,
        r#"{"table": "orders", "columns": ["id", "total"], "values": [10, 9.5]}"#,
    ]);

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "load",
            "--input",
            input.path().to_str().unwrap(),
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run completed!"))
        .stdout(predicate::str::contains("Rows: 3/3"));
}

#[test]
fn test_dry_run_load_json_output() {
    let config = config_file("");
    let input = input_file(&[
        r#"{"table": "users", "columns": ["id"], "values": [1]}"#,
        r#"{"table": "users", "columns": ["id"], "values": [2]}"#,
    ]);

    let output = cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "--output-json",
            "load",
            "--input",
            input.path().to_str().unwrap(),
            "--dry-run",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["rows_added"], 2);
    assert_eq!(report["rows_written"], 2);
    assert_eq!(report["rows_dropped"], 0);
}

#[test]
fn test_malformed_input_exits_with_code_4() {
    let config = config_file("");
    let input = input_file(&[
        r#"{"table": "users", "columns": ["id"], "values": [1]}"#,
        r#"{"columns": ["id"], "values": [2]}"#,
    ]);

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "load",
            "--input",
            input.path().to_str().unwrap(),
            "--dry-run",
        ])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("line 2"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
