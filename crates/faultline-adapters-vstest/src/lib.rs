//! VSTest (`.trx`) report converter for faultline.
//!
//! Walks a Visual Studio test results document tag by tag and turns every
//! failed `UnitTestResult` into a [`Violation`]. The failing test's source
//! location is recovered from the free-form stack trace embedded in the
//! report: the last frame of the trace is the test method as declared in
//! source, which is what gets reported.
//!
//! # Example
//!
//! ```
//! use faultline_adapters_vstest::parse_vstest;
//!
//! let trx = r#"<TestRun><Results>
//!   <UnitTestResult testName="T1" outcome="Failed">
//!     <Output><ErrorInfo>
//!       <Message>boom</Message>
//!       <StackTrace>   at NS.Cls.Method() in /a/b.cs:line 10</StackTrace>
//!     </ErrorInfo></Output>
//!   </UnitTestResult>
//! </Results></TestRun>"#;
//!
//! let violations = parse_vstest(trx).unwrap();
//! let violation = violations.first().unwrap();
//! assert_eq!(violation.file(), "/a/b.cs");
//! assert_eq!(violation.start_line(), 10);
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use faultline_adapters_xml::XmlTagReader;
use faultline_ports::{ReportParser, TagEvent, TagReader};
use faultline_types::{
    BuildError, Parser, Severity, Specifics, Violation, ViolationSet, normalize_path_with_strip,
};
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, trace};

// ============================================================================
// Constants
// ============================================================================

const TAG_RESULTS: &str = "Results";
const TAG_UNIT_TEST_RESULT: &str = "UnitTestResult";
const TAG_OUTPUT: &str = "Output";
const TAG_ERROR_INFO: &str = "ErrorInfo";
const TAG_MESSAGE: &str = "Message";
const TAG_STACK_TRACE: &str = "StackTrace";

const ATTR_OUTCOME: &str = "outcome";
const ATTR_TEST_NAME: &str = "testName";
const OUTCOME_FAILED: &str = "Failed";

/// Test name used when a result carries no `testName` attribute.
pub const UNKNOWN_TEST_NAME: &str = "UNKNOWN";

/// Default maximum number of characters kept from a failure message.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 512;

/// Default maximum number of characters kept from a stack trace.
pub const DEFAULT_MAX_STACK_TRACE_LEN: usize = 512;

/// Appended to text cut short by [`truncate`].
pub const TRUNCATED_MARKER: &str = " [TRUNCATED]";

/// Keys this converter stores in [`Violation::specifics`].
pub mod specifics {
    /// Name of the failed test.
    pub const TEST_NAME: &str = "testName";
    /// First matching stack-trace line, verbatim.
    pub const FAILURE_LOCATION: &str = "failureLocation";
    /// Method signature of the first matching stack-trace line.
    pub const FAILED_METHOD: &str = "failedMethod";
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while converting a VSTest report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VsTestError {
    /// The report is not well-formed XML.
    #[error("Invalid VSTest report: {0}")]
    InvalidXml(String),

    /// A violation could not be assembled.
    #[error(transparent)]
    Build(#[from] BuildError),
}

// ============================================================================
// Options
// ============================================================================

/// Tuning knobs for the VSTest converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VsTestOptions {
    /// Maximum characters of the failure message kept in the description.
    pub max_message_len: usize,
    /// Maximum characters of the stack trace kept in the description.
    pub max_stack_trace_len: usize,
    /// Prefixes stripped from file paths found in stack traces.
    pub path_strip: Vec<String>,
}

impl Default for VsTestOptions {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_stack_trace_len: DEFAULT_MAX_STACK_TRACE_LEN,
            path_strip: Vec::new(),
        }
    }
}

// ============================================================================
// Sanitization
// ============================================================================

static CHAR_REF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#x[0-9A-Fa-f]+;").expect("valid char ref pattern"));

/// Remove hexadecimal character references such as `&#x1B;`.
///
/// Test runners embed these for control bytes captured from console output,
/// but most of them are not allowed in XML and would abort the scan.
///
/// # Examples
///
/// ```
/// use faultline_adapters_vstest::strip_char_refs;
///
/// assert_eq!(strip_char_refs("a&#x1B;[0mb"), "a[0mb");
/// assert_eq!(strip_char_refs("plain &amp; text"), "plain &amp; text");
/// ```
pub fn strip_char_refs(text: &str) -> Cow<'_, str> {
    CHAR_REF_PATTERN.replace_all(text, "")
}

// ============================================================================
// Stack-Trace Locator
// ============================================================================

// Groups: 1 = method signature, 2 = file path, 3 = line number.
// `\s` and `\w` match ASCII only.
static FRAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?-u:\s)*(?-u:\w)+(?-u:\s)+([^(]+\([^)]*\))(?-u:\s)+(?-u:\w)+(?-u:\s)+(.+):line(?-u:\s)+([0-9]+)")
        .expect("valid stack frame pattern")
});

/// One stack-trace line of the form `at Method(args) in path:line N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The whole matched text, including leading indentation.
    pub text: String,
    /// Method signature, e.g. `NS.Cls.Method(Int32 x)`.
    pub method: String,
    /// Source file path as written in the trace.
    pub file: String,
    /// Line number, or 0 if it does not fit in a `u32`.
    pub line: u32,
}

impl Frame {
    fn from_captures(caps: &Captures<'_>) -> Self {
        Self {
            text: caps[0].to_string(),
            method: caps[1].to_string(),
            file: caps[2].to_string(),
            line: caps[3].parse().unwrap_or(0),
        }
    }
}

/// The frames of interest in a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMatch {
    /// First frame: where the failure was raised.
    pub failure: Frame,
    /// Last frame: the test method itself.
    pub test: Frame,
}

/// Find every frame line in a stack trace, in order of appearance.
pub fn find_frames(stack_trace: &str) -> Vec<Frame> {
    FRAME_PATTERN
        .captures_iter(stack_trace)
        .map(|caps| Frame::from_captures(&caps))
        .collect()
}

/// Locate the failure frame and the test frame of a stack trace.
///
/// Returns `None` when no line matches the frame grammar. With a single
/// matching line, both frames are that line.
pub fn locate_test_frame(stack_trace: &str) -> Option<FrameMatch> {
    let frames = find_frames(stack_trace);
    let failure = frames.first()?.clone();
    let test = frames.last()?.clone();
    Some(FrameMatch { failure, test })
}

// ============================================================================
// Truncation
// ============================================================================

/// Keep at most `max_chars` characters of `text`, marking the cut.
///
/// Counts Unicode scalar values, so multi-byte characters are never split.
///
/// # Examples
///
/// ```
/// use faultline_adapters_vstest::truncate;
///
/// assert_eq!(truncate("abc", 3), "abc");
/// assert_eq!(truncate("abcd", 3), "abc [TRUNCATED]");
/// ```
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &text[..cut], TRUNCATED_MARKER)),
        None => Cow::Borrowed(text),
    }
}

/// Trim ASCII control characters and spaces from both ends.
///
/// Other Unicode whitespace such as U+00A0 is kept.
fn trim_control(text: &str) -> &str {
    text.trim_matches(|c: char| c <= ' ')
}

// ============================================================================
// State Machine
// ============================================================================

/// Progress through one `UnitTestResult` element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Step {
    /// No failed test is open.
    #[default]
    Idle,
    /// Inside a failed test, waiting for `<Output>`.
    AwaitingOutput,
    /// Inside `<Output>`, waiting for `<ErrorInfo>`.
    AwaitingErrorInfo,
    /// Inside `<ErrorInfo>`: message and stack trace are collected.
    InErrorInfo,
}

/// Start tags the state machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTag {
    TestResult { failed: bool },
    Output,
    ErrorInfo,
    Message,
    StackTrace,
    Other,
}

impl ReportTag {
    /// Classify the start tag the reader is positioned on.
    pub fn classify<R: TagReader>(reader: &R) -> Self {
        let name = reader.local_name();
        if name.eq_ignore_ascii_case(TAG_UNIT_TEST_RESULT) {
            let failed = reader
                .attribute(ATTR_OUTCOME)
                .is_some_and(|outcome| outcome.eq_ignore_ascii_case(OUTCOME_FAILED));
            ReportTag::TestResult { failed }
        } else if name.eq_ignore_ascii_case(TAG_OUTPUT) {
            ReportTag::Output
        } else if name.eq_ignore_ascii_case(TAG_ERROR_INFO) {
            ReportTag::ErrorInfo
        } else if name.eq_ignore_ascii_case(TAG_MESSAGE) {
            ReportTag::Message
        } else if name.eq_ignore_ascii_case(TAG_STACK_TRACE) {
            ReportTag::StackTrace
        } else {
            ReportTag::Other
        }
    }
}

impl Step {
    /// Transition on a start tag.
    ///
    /// A test result always restarts the machine. `Output` and `ErrorInfo`
    /// only advance from the step directly before them; every other tag,
    /// including out-of-place ones, leaves the step unchanged.
    pub fn on_start(self, tag: ReportTag) -> Step {
        match (self, tag) {
            (_, ReportTag::TestResult { failed: true }) => Step::AwaitingOutput,
            (_, ReportTag::TestResult { failed: false }) => Step::Idle,
            (Step::AwaitingOutput, ReportTag::Output) => Step::AwaitingErrorInfo,
            (Step::AwaitingErrorInfo, ReportTag::ErrorInfo) => Step::InErrorInfo,
            (step, _) => step,
        }
    }

    /// Whether closing the test result should emit a violation.
    ///
    /// Only failed tests that reached their `<Output>` are reported.
    pub fn emits_on_close(self) -> bool {
        matches!(self, Step::AwaitingErrorInfo | Step::InErrorInfo)
    }

    /// Whether `<Message>` and `<StackTrace>` content is collected.
    pub fn collects_error_info(self) -> bool {
        self == Step::InErrorInfo
    }
}

// ============================================================================
// Failed Test Record
// ============================================================================

/// Fields collected for one failed test.
#[derive(Debug, Clone, Default)]
struct FailedTest {
    test_name: String,
    message: Option<String>,
    stack_trace: Option<String>,
    test_frame: Option<Frame>,
    specifics: Specifics,
}

impl FailedTest {
    fn new(test_name: String) -> Self {
        let mut specifics = Specifics::new();
        specifics.insert(specifics::TEST_NAME.to_string(), test_name.clone());
        Self {
            test_name,
            specifics,
            ..Default::default()
        }
    }

    fn set_message(&mut self, raw: &str) {
        self.message = Some(trim_control(&raw.replace('\r', "")).to_string());
    }

    fn set_stack_trace(&mut self, raw: &str) {
        let stack_trace = raw.replace('\r', "");
        if let Some(found) = locate_test_frame(&stack_trace) {
            self.specifics.insert(
                specifics::FAILURE_LOCATION.to_string(),
                found.failure.text,
            );
            self.specifics
                .insert(specifics::FAILED_METHOD.to_string(), found.failure.method);
            self.test_frame = Some(found.test);
        }
        self.stack_trace = Some(stack_trace);
    }

    /// Compose the human-readable description.
    fn describe(&self, options: &VsTestOptions) -> String {
        let mut description = format!("Test: {} failed", self.test_name);

        if let Some(message) = &self.message {
            description.push_str("\nwith message:\n");
            description.push_str(&truncate(message, options.max_message_len));
        }

        if let Some(stack_trace) = &self.stack_trace {
            description.push_str("\n\nstack trace:\n");
            description.push_str(&truncate(stack_trace, options.max_stack_trace_len));
        }

        description
    }

    fn into_violation(self, options: &VsTestOptions) -> Result<Violation, BuildError> {
        let message = self.describe(options);
        let (file, line, source) = match self.test_frame {
            Some(frame) => (
                normalize_path_with_strip(&frame.file, &options.path_strip),
                frame.line,
                Some(frame.method),
            ),
            None => (self.test_name, 0, None),
        };

        Violation::builder(Parser::VsTest)
            .file(file)
            .message(message)
            .source(source)
            .severity(Severity::Error)
            .specifics(self.specifics)
            .start_line(line)
            .build()
    }
}

// ============================================================================
// Scanning
// ============================================================================

fn invalid<E: std::fmt::Display>(err: E) -> VsTestError {
    VsTestError::InvalidXml(err.to_string())
}

/// Drive a tag reader over a VSTest document and collect violations.
///
/// Scanning stops at the closing `</Results>` tag; anything after it is
/// never read.
pub fn scan_results<R: TagReader>(
    reader: &mut R,
    options: &VsTestOptions,
) -> Result<ViolationSet, VsTestError> {
    let mut violations = ViolationSet::new();
    let mut step = Step::Idle;
    let mut current: Option<FailedTest> = None;

    while reader.has_next() {
        match reader.next_event().map_err(invalid)? {
            TagEvent::Start => {
                let tag = ReportTag::classify(reader);
                let next = step.on_start(tag);
                if next != step {
                    trace!(from = ?step, to = ?next, tag = reader.local_name(), "step");
                }

                match tag {
                    ReportTag::TestResult { failed } => {
                        current = failed.then(|| {
                            let test_name = reader
                                .attribute(ATTR_TEST_NAME)
                                .unwrap_or_else(|| UNKNOWN_TEST_NAME.to_string());
                            FailedTest::new(test_name)
                        });
                    }
                    ReportTag::Message if step.collects_error_info() => {
                        let text = reader.element_text().map_err(invalid)?;
                        if let Some(test) = current.as_mut() {
                            test.set_message(&text);
                        }
                    }
                    ReportTag::StackTrace if step.collects_error_info() => {
                        let text = reader.element_text().map_err(invalid)?;
                        if let Some(test) = current.as_mut() {
                            test.set_stack_trace(&text);
                        }
                    }
                    _ => {}
                }

                step = next;
            }
            TagEvent::End => {
                let name = reader.local_name();
                if name.eq_ignore_ascii_case(TAG_RESULTS) {
                    break;
                }
                if name.eq_ignore_ascii_case(TAG_UNIT_TEST_RESULT) {
                    if let Some(test) = current.take().filter(|_| step.emits_on_close()) {
                        let violation = test.into_violation(options)?;
                        debug!(
                            file = violation.file(),
                            line = violation.start_line(),
                            "failed test"
                        );
                        violations.insert(violation);
                    }
                    step = Step::Idle;
                }
            }
            TagEvent::Other => {}
        }
    }

    Ok(violations)
}

// ============================================================================
// Parser
// ============================================================================

/// Converter for Visual Studio test result reports.
#[derive(Debug, Clone, Default)]
pub struct VsTestParser {
    options: VsTestOptions,
}

impl VsTestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: VsTestOptions) -> Self {
        Self { options }
    }

    /// Convert the full text of a `.trx` report.
    pub fn parse(&self, text: &str) -> Result<ViolationSet, VsTestError> {
        let cleaned = strip_char_refs(text);
        if let Cow::Owned(_) = cleaned {
            debug!(
                removed_bytes = text.len() - cleaned.len(),
                "stripped character references"
            );
        }

        let mut reader = XmlTagReader::from_text(&cleaned);
        let violations = scan_results(&mut reader, &self.options)?;
        debug!(count = violations.len(), "parsed VSTest report");
        Ok(violations)
    }
}

impl ReportParser for VsTestParser {
    fn parser(&self) -> Parser {
        Parser::VsTest
    }

    fn parse_report(&self, text: &str) -> Result<ViolationSet, String> {
        self.parse(text).map_err(|e| e.to_string())
    }
}

/// Convert a `.trx` report with default options.
pub fn parse_vstest(text: &str) -> Result<ViolationSet, VsTestError> {
    VsTestParser::new().parse(text)
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

    proptest! {
        /// Truncation keeps a prefix and marks exactly when over the limit
        #[test]
        fn truncate_marks_iff_over_limit(text in "\\PC{0,80}", max in 0usize..60) {
            let cut = truncate(&text, max);
            let len = text.chars().count();
            if len > max {
                let prefix: String = text.chars().take(max).collect();
                prop_assert_eq!(cut.into_owned(), format!("{}{}", prefix, TRUNCATED_MARKER));
            } else {
                prop_assert_eq!(cut.into_owned(), text);
            }
        }

        /// The test frame is always the last of N frames
        #[test]
        fn last_frame_wins(lines in prop::collection::vec(1u32..100_000, 1..8)) {
            let trace: String = lines
                .iter()
                .enumerate()
                .map(|(i, line)| format!("   at NS.C.M{}() in /src/f{}.cs:line {}\n", i, i, line))
                .collect();

            let found = locate_test_frame(&trace).unwrap();
            let last = lines.len() - 1;
            prop_assert_eq!(found.test.line, lines[last]);
            prop_assert_eq!(found.test.file, format!("/src/f{}.cs", last));
            prop_assert_eq!(found.test.method, format!("NS.C.M{}()", last));
            prop_assert_eq!(found.failure.line, lines[0]);
        }

        /// Reports without failed results never produce violations
        #[test]
        fn no_failures_no_violations(
            outcomes in prop::collection::vec(
                prop_oneof![Just("Passed"), Just("NotExecuted"), Just("Inconclusive")],
                0..6,
            ),
        ) {
            let results: String = outcomes
                .iter()
                .enumerate()
                .map(|(i, outcome)| format!(
                    "<UnitTestResult testName=\"T{}\" outcome=\"{}\"><Output><ErrorInfo><Message>m</Message></ErrorInfo></Output></UnitTestResult>",
                    i, outcome
                ))
                .collect();
            let xml = format!("<TestRun><Results>{}</Results></TestRun>", results);

            prop_assert!(parse_vstest(&xml).unwrap().is_empty());
        }
    }
}
