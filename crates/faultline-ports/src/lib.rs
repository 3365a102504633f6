//! Shared port traits for faultline's hexagonal architecture.

use std::fmt::Display;

use faultline_types::{Parser, ViolationSet};

/// Kind of event a [`TagReader`] advanced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEvent {
    /// An element start tag (also reported for `<empty/>` elements).
    Start,
    /// An element end tag (also reported right after an empty element's start).
    End,
    /// Anything else: text, comments, declarations, end of document.
    Other,
}

/// Port for walking an XML document one tag at a time.
pub trait TagReader {
    /// Error raised when the underlying document is structurally invalid.
    type Error: Display;

    /// Returns `false` once the end of the document has been reached.
    fn has_next(&self) -> bool;

    /// Advance to the next event and report its kind.
    fn next_event(&mut self) -> Result<TagEvent, Self::Error>;

    /// Local name of the current start or end tag.
    fn local_name(&self) -> &str;

    /// Read the text content of the current element.
    ///
    /// Must be called on a start tag. Consumes input through the matching
    /// end tag, which becomes the current event. Child elements are an error.
    fn element_text(&mut self) -> Result<String, Self::Error>;

    /// Value of the named attribute on the current start tag.
    ///
    /// Attribute names are compared ASCII case-insensitively.
    fn attribute(&self, name: &str) -> Option<String>;
}

/// Port implemented by every report converter.
pub trait ReportParser {
    /// Which converter this is.
    fn parser(&self) -> Parser;

    /// Convert the full text of one report into violations.
    fn parse_report(&self, text: &str) -> Result<ViolationSet, String>;
}
