//! Integration tests for the faultline CLI.
//!
//! These tests exercise the CLI as a subprocess with real fixtures,
//! verifying exit codes, output files, and error handling.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the faultline binary.
///
/// Runs inside a fresh directory so no `faultline.toml` is discovered, and
/// with logging environment cleared.
fn faultline(cwd: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_faultline"));
    cmd.current_dir(cwd.path()).env_remove("FAULTLINE_LOG");
    cmd
}

/// Get the project root directory (for accessing fixtures).
fn project_root() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

/// Get the path to a fixture file.
fn fixture(path: &str) -> String {
    project_root().join(path).display().to_string()
}

const RESULTS_TRX: &str = "fixtures/vstest/vstest-test-results.trx";
const ALL_PASSED_TRX: &str = "fixtures/vstest/all-passed.trx";
const TRUNCATED_TRX: &str = "fixtures/vstest/truncated.trx";

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("faultline"))
        .stdout(predicate::str::contains("parse"));
}

#[test]
fn test_parse_help_displays_options() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["parse", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--out"))
        .stdout(predicate::str::contains("--md"))
        .stdout(predicate::str::contains("--annotations"))
        .stdout(predicate::str::contains("--max-message-len"))
        .stdout(predicate::str::contains("--path-strip"))
        .stdout(predicate::str::contains("--fail-on"));
}

// ============================================================================
// Parse Tests
// ============================================================================

#[test]
fn test_failed_tests_exit_with_policy_failure() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out/report.json");

    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX), "--out"])
        .arg(&out)
        .assert()
        .code(2);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["schema"], "faultline.report.v1");
    assert_eq!(json["parser"], "VSTEST");
    assert_eq!(json["counts"]["error"], 4);

    let violations = json["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 4);
    assert_eq!(violations[0]["start_line"], 22);
    assert_eq!(violations[0]["specifics"]["testName"], "Test2");
    assert_eq!(
        violations[0]["file"],
        "C:/Projects/xrp_test/violations-lib/src/test/resources/vstest/UnitTest1.cs"
    );
}

#[test]
fn test_all_passed_exits_zero_and_prints_json() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["parse", &fixture(ALL_PASSED_TRX)])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"violations\": []"));
}

#[test]
fn test_fail_on_never_exits_zero() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX), "--fail-on", "never"])
        .assert()
        .success();
}

#[test]
fn test_path_strip_and_markdown_output() {
    let dir = TempDir::new().unwrap();
    let md = dir.path().join("summary.md");

    faultline(&dir)
        .args([
            "parse",
            &fixture(RESULTS_TRX),
            "--fail-on",
            "never",
            "--path-strip",
            "C:/Projects/xrp_test/violations-lib/",
            "--md",
        ])
        .arg(&md)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "\"file\": \"src/test/resources/vstest/UnitTest1.cs\"",
        ));

    let markdown = fs::read_to_string(&md).unwrap();
    assert!(markdown.contains("## faultline: VSTEST report"));
    assert!(markdown.contains("**Violations**: 4 (error: 4, warn: 0, info: 0)"));
    assert!(markdown.contains("| src/test/resources/vstest/UnitTest1.cs | 22 |"));
}

#[test]
fn test_annotations_are_printed() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("report.json");

    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX), "--annotations", "--out"])
        .arg(&out)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("::error file=C%3A/Projects/"))
        .stdout(predicate::str::contains("line=36,title=Test%3A SupClassTest(2) failed::"));
}

#[test]
fn test_message_limit_from_cli() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args([
            "parse",
            &fixture(RESULTS_TRX),
            "--fail-on",
            "never",
            "--max-message-len",
            "6",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("System [TRUNCATED]"));
}

#[test]
fn test_zero_message_limit_is_rejected() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX), "--max-message-len", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--max-message-len"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_discovered_config_is_applied() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("faultline.toml"),
        "fail_on = \"never\"\n[normalize]\npath_strip = [\"c:/jenkins/workspace/\"]\n",
    )
    .unwrap();

    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX)])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "\"file\": \"dev/Common/Common.Settings.Test/",
        ));
}

#[test]
fn test_cli_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "fail_on = \"never\"\n").unwrap();

    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX), "-c"])
        .arg(&config)
        .args(["--fail-on", "error"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_config_is_runtime_error() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("faultline.toml"),
        "[truncate]\nmax_message_len = 0\n",
    )
    .unwrap();

    faultline(&dir)
        .args(["parse", &fixture(RESULTS_TRX)])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: Failed to load config"));
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_missing_report_file() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["parse", "does-not-exist.trx"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: Failed to read file"));
}

#[test]
fn test_truncated_report_is_runtime_error() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["parse", &fixture(TRUNCATED_TRX)])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid VSTest report"));
}

#[test]
fn test_verbose_logs_to_stderr() {
    let dir = TempDir::new().unwrap();
    faultline(&dir)
        .args(["-v", "parse", &fixture(ALL_PASSED_TRX)])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed VSTest report"));
}
