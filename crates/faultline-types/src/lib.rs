//! Core types for faultline.
//!
//! This crate defines the canonical `Violation` record every converter
//! produces, its builder, the severity and parser enums, and the report
//! envelope used by the output layer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Schema Constants
// ============================================================================

/// Schema identifier for the faultline report format.
pub const SCHEMA_ID: &str = "faultline.report.v1";

// ============================================================================
// Enums
// ============================================================================

/// Severity level for violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the converter that produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum Parser {
    /// Visual Studio test results (`.trx`).
    VsTest,
}

impl Parser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Parser::VsTest => "VSTEST",
        }
    }
}

impl fmt::Display for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Path Normalization
// ============================================================================

/// Normalize a reported file path.
///
/// Converts backslashes to forward slashes and removes leading `./`.
///
/// # Examples
///
/// ```
/// use faultline_types::normalize_path;
///
/// assert_eq!(normalize_path("C:\\src\\Test.cs"), "C:/src/Test.cs");
/// assert_eq!(normalize_path("./src/Test.cs"), "src/Test.cs");
/// ```
pub fn normalize_path(path: &str) -> String {
    normalize_path_with_strip(path, &[])
}

/// Normalize a reported file path, stripping the first matching prefix.
///
/// Prefixes are compared after their own backslashes are converted, so
/// `C:\repo\` and `C:/repo/` strip the same paths.
pub fn normalize_path_with_strip(path: &str, strip_prefixes: &[String]) -> String {
    let mut normalized = path.replace('\\', "/");

    for prefix in strip_prefixes {
        let prefix_norm = prefix.replace('\\', "/");
        if !prefix_norm.is_empty() && normalized.starts_with(&prefix_norm) {
            normalized = normalized[prefix_norm.len()..].to_string();
            break;
        }
    }

    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }

    normalized
}

// ============================================================================
// Violation
// ============================================================================

/// Format-specific metadata attached to a violation.
pub type Specifics = BTreeMap<String, String>;

/// Ordered, duplicate-free collection of violations.
pub type ViolationSet = BTreeSet<Violation>;

/// A single finding produced by a converter.
///
/// Violations are immutable once built. Equality and ordering cover the
/// observable fields only; `specifics` is carried along but never compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    parser: Parser,
    file: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
    start_line: u32,
    end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    specifics: Specifics,
}

impl Violation {
    /// Start building a violation for the given converter.
    pub fn builder(parser: Parser) -> ViolationBuilder {
        ViolationBuilder::new(parser)
    }

    pub fn parser(&self) -> Parser {
        self.parser
    }

    /// Path or identifier of the offending file, with forward slashes.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Signature of the originating code construct, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn rule(&self) -> Option<&str> {
        self.rule.as_deref()
    }

    /// 1-based start line, or 0 when unknown.
    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn column(&self) -> Option<u32> {
        self.column
    }

    pub fn specifics(&self) -> &Specifics {
        &self.specifics
    }

    /// Look up a single format-specific value.
    pub fn specific(&self, key: &str) -> Option<&str> {
        self.specifics.get(key).map(String::as_str)
    }
}

impl Ord for Violation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then_with(|| self.start_line.cmp(&other.start_line))
            .then_with(|| self.end_line.cmp(&other.end_line))
            .then_with(|| self.severity.cmp(&other.severity))
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.rule.cmp(&other.rule))
            .then_with(|| self.column.cmp(&other.column))
            .then_with(|| self.parser.cmp(&other.parser))
    }
}

impl PartialOrd for Violation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Violation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Violation {}

// ============================================================================
// Builder
// ============================================================================

/// Errors returned when a violation is built without a required field.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    #[error("Violation is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Fluent builder for [`Violation`].
///
/// # Examples
///
/// ```
/// use faultline_types::{Parser, Severity, Violation};
///
/// let violation = Violation::builder(Parser::VsTest)
///     .file("C:\\src\\Tests.cs")
///     .message("Test: T1 failed")
///     .severity(Severity::Error)
///     .start_line(10)
///     .build()
///     .unwrap();
///
/// assert_eq!(violation.file(), "C:/src/Tests.cs");
/// assert_eq!(violation.end_line(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct ViolationBuilder {
    parser: Parser,
    file: Option<String>,
    message: Option<String>,
    source: Option<String>,
    severity: Option<Severity>,
    rule: Option<String>,
    start_line: u32,
    end_line: Option<u32>,
    column: Option<u32>,
    specifics: Specifics,
}

impl ViolationBuilder {
    pub fn new(parser: Parser) -> Self {
        Self {
            parser,
            file: None,
            message: None,
            source: None,
            severity: None,
            rule: None,
            start_line: 0,
            end_line: None,
            column: None,
            specifics: Specifics::new(),
        }
    }

    /// Set the file. Backslashes are converted to forward slashes.
    pub fn file(mut self, file: impl AsRef<str>) -> Self {
        self.file = Some(normalize_path(file.as_ref()));
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn rule(mut self, rule: Option<String>) -> Self {
        self.rule = rule;
        self
    }

    pub fn start_line(mut self, line: u32) -> Self {
        self.start_line = line;
        self
    }

    /// Set the end line. Defaults to the start line when never called.
    pub fn end_line(mut self, line: u32) -> Self {
        self.end_line = Some(line);
        self
    }

    pub fn column(mut self, column: Option<u32>) -> Self {
        self.column = column;
        self
    }

    /// Replace all format-specific metadata.
    pub fn specifics(mut self, specifics: Specifics) -> Self {
        self.specifics = specifics;
        self
    }

    pub fn specific(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.specifics.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Violation, BuildError> {
        let file = self.file.ok_or(BuildError::MissingField("file"))?;
        let message = self.message.ok_or(BuildError::MissingField("message"))?;
        let severity = self.severity.ok_or(BuildError::MissingField("severity"))?;

        Ok(Violation {
            parser: self.parser,
            file,
            message,
            source: self.source,
            severity,
            rule: self.rule,
            start_line: self.start_line,
            end_line: self.end_line.unwrap_or(self.start_line),
            column: self.column,
            specifics: self.specifics,
        })
    }
}

// ============================================================================
// Report Envelope
// ============================================================================

/// Information about the tool that generated the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub version: String,
}

impl Default for Tool {
    fn default() -> Self {
        Self {
            name: "faultline".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Counts of violations by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: u32,
    pub warn: u32,
    pub error: u32,
}

impl SeverityCounts {
    pub fn from_violations<'a>(violations: impl IntoIterator<Item = &'a Violation>) -> Self {
        let mut counts = Self::default();
        for violation in violations {
            match violation.severity() {
                Severity::Info => counts.info += 1,
                Severity::Warn => counts.warn += 1,
                Severity::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.info + self.warn + self.error
    }
}

/// Output envelope for the violations of one parsed report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub schema: String,
    pub tool: Tool,
    pub parser: Parser,
    /// Path of the parsed report, when it came from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub counts: SeverityCounts,
    /// Violations in their natural order.
    pub violations: Vec<Violation>,
}

impl Report {
    pub fn new(parser: Parser, source: Option<String>, violations: ViolationSet) -> Self {
        let counts = SeverityCounts::from_violations(&violations);
        Self {
            schema: SCHEMA_ID.to_string(),
            tool: Tool::default(),
            parser,
            source,
            counts,
            violations: violations.into_iter().collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_violation() -> impl Strategy<Value = Violation> {
        (
            "[a-c]{1,3}",
            0u32..5,
            prop_oneof![Just(Severity::Info), Just(Severity::Warn), Just(Severity::Error)],
            "[x-z]{0,3}",
            proptest::option::of("[m-n]{1,2}"),
        )
            .prop_map(|(file, line, severity, message, source)| {
                Violation::builder(Parser::VsTest)
                    .file(file)
                    .message(message)
                    .severity(severity)
                    .start_line(line)
                    .source(source)
                    .build()
                    .unwrap()
            })
    }

    proptest! {
        /// Ordering is consistent with equality
        #[test]
        fn ordering_consistent_with_equality(a in arb_violation(), b in arb_violation()) {
            prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        /// Collecting the same violations in any order yields the same sequence
        #[test]
        fn set_order_is_insertion_independent(
            violations in prop::collection::vec(arb_violation(), 0..12),
        ) {
            let forward: ViolationSet = violations.iter().cloned().collect();
            let backward: ViolationSet = violations.iter().rev().cloned().collect();
            let forward: Vec<_> = forward.into_iter().collect();
            let backward: Vec<_> = backward.into_iter().collect();
            prop_assert_eq!(forward, backward);
        }

        /// Path normalization is idempotent
        #[test]
        fn normalize_path_idempotent(path in "[a-z/\\\\.]{1,40}") {
            let once = normalize_path(&path);
            let twice = normalize_path(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
