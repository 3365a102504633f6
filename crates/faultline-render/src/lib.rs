//! Rendering utilities for faultline reports.
//!
//! This crate provides renderers that convert a `Report` into various output formats:
//! - JSON for machine consumption
//! - Markdown for PR comments and job summaries
//! - GitHub workflow annotation commands
//!
//! # Example
//!
//! ```rust
//! use faultline_render::{render_annotations, render_json, render_markdown};
//! use faultline_types::{Parser, Report, ViolationSet};
//!
//! let report = Report::new(Parser::VsTest, None, ViolationSet::new());
//! let json = render_json(&report).unwrap();
//! let markdown = render_markdown(&report, 10);
//! let annotations = render_annotations(&report, 25);
//! assert!(json.contains("faultline.report.v1"));
//! assert!(annotations.is_empty());
//! ```

use faultline_types::{Report, Severity, Violation};

// ============================================================================
// JSON
// ============================================================================

/// Renders the report as pretty-printed JSON.
pub fn render_json(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

// ============================================================================
// Markdown
// ============================================================================

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Renders the report as a Markdown summary.
///
/// # Example Output
///
/// ```markdown
/// ## faultline: VSTEST report
///
/// **Violations**: 1 (error: 1, warn: 0, info: 0)
///
/// | File | Line | Source | Message |
/// |------|------|--------|---------|
/// | src/Tests.cs | 22 | NS.Tests.Test2() | Test: Test2 failed |
/// ```
pub fn render_markdown(report: &Report, max_rows: usize) -> String {
    let mut output = String::new();

    output.push_str(&format!("## faultline: {} report\n\n", report.parser));

    if let Some(source) = &report.source {
        output.push_str(&format!("**Source**: `{}`\n\n", source));
    }

    let counts = &report.counts;
    output.push_str(&format!(
        "**Violations**: {} (error: {}, warn: {}, info: {})\n",
        counts.total(),
        counts.error,
        counts.warn,
        counts.info
    ));

    if report.violations.is_empty() {
        output.push_str("\nNo violations found.\n");
        return output;
    }

    output.push_str("\n| File | Line | Source | Message |\n");
    output.push_str("|------|------|--------|---------|\n");

    for violation in report.violations.iter().take(max_rows) {
        output.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            escape_cell(violation.file()),
            violation.start_line(),
            escape_cell(violation.source().unwrap_or("-")),
            escape_cell(first_line(violation.message())),
        ));
    }

    let total = report.violations.len();
    if total > max_rows {
        output.push('\n');
        output.push_str(&format!(
            "*Showing {} of {} violations*\n",
            max_rows, total
        ));
    }

    output
}

// ============================================================================
// GitHub Annotations
// ============================================================================

/// Escape a workflow command message.
fn escape_data(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a workflow command property value.
fn escape_property(text: &str) -> String {
    escape_data(text).replace(':', "%3A").replace(',', "%2C")
}

fn annotation_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warn => "warning",
        Severity::Info => "notice",
    }
}

fn annotation(violation: &Violation) -> String {
    let mut params = vec![format!("file={}", escape_property(violation.file()))];

    // Line 0 means the location is unknown.
    if violation.start_line() > 0 {
        params.push(format!("line={}", violation.start_line()));
        if violation.end_line() > violation.start_line() {
            params.push(format!("endLine={}", violation.end_line()));
        }
    }

    if let Some(column) = violation.column() {
        params.push(format!("col={}", column));
    }

    params.push(format!(
        "title={}",
        escape_property(first_line(violation.message()))
    ));

    format!(
        "::{} {}::{}",
        annotation_level(violation.severity()),
        params.join(","),
        escape_data(violation.message())
    )
}

/// Renders the report as GitHub workflow annotation commands.
///
/// # Example Output
///
/// ```text
/// ::error file=src/Tests.cs,line=22,title=Test: Test2 failed::Test: Test2 failed%0Awith message:%0Aboom
/// ```
///
/// (`:` in the title is escaped as `%3A` in the actual output.)
pub fn render_annotations(report: &Report, max_annotations: usize) -> String {
    let mut output = String::new();

    for violation in report.violations.iter().take(max_annotations) {
        output.push_str(&annotation(violation));
        output.push('\n');
    }

    output
}

// ============================================================================
// Tests
// ============================================================================
