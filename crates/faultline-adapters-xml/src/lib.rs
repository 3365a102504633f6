//! Streaming XML tag reader for faultline.
//!
//! This crate adapts `quick-xml` to the [`TagReader`] port: converters walk
//! a report tag by tag, pull attributes from the current start tag, and read
//! the text of leaf elements without building a DOM.

use faultline_ports::{TagEvent, TagReader};
use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::LocalName;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Structural problems found while reading an XML document.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The underlying reader rejected the document.
    #[error("Malformed XML at byte {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// Text or an attribute value contains a character XML does not allow,
    /// usually from a character reference such as `&#27;`.
    #[error("Character U+{code:04X} not allowed in XML at byte {position}")]
    InvalidChar { position: u64, code: u32 },

    /// An attribute could not be parsed.
    #[error("Malformed attribute at byte {position}: {source}")]
    Attribute {
        position: u64,
        #[source]
        source: AttrError,
    },

    /// A tag name or CDATA section is not valid UTF-8.
    #[error("Invalid UTF-8 at byte {position}")]
    Encoding { position: u64 },

    /// The document ended while elements were still open.
    #[error("Unexpected end of document with {open} unclosed element(s)")]
    UnexpectedEof { open: usize },

    /// The document contains no element at all.
    #[error("Document has no root element")]
    NoRootElement,

    /// `element_text` found a child element inside a text-only element.
    #[error("Expected text only in <{element}> but found <{child}> at byte {position}")]
    UnexpectedElement {
        element: String,
        child: String,
        position: u64,
    },

    /// `element_text` was called while not positioned on a start tag.
    #[error("Text can only be read from a start tag")]
    NotOnStartTag,
}

// ============================================================================
// Character Validation
// ============================================================================

/// Whether `c` matches the XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}' | '\u{A}' | '\u{D}'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

fn check_chars(text: &str, position: u64) -> Result<(), XmlError> {
    match text.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(XmlError::InvalidChar {
            position,
            code: c as u32,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Reader
// ============================================================================

/// A [`TagReader`] over an in-memory UTF-8 document.
///
/// Empty elements (`<Output/>`) are reported as a start tag followed by an
/// end tag, so callers never need a separate code path for them.
pub struct XmlTagReader<'a> {
    reader: Reader<&'a [u8]>,
    current: Option<TagEvent>,
    name: String,
    attributes: Vec<(String, String)>,
    depth: usize,
    seen_root: bool,
    finished: bool,
}

impl<'a> XmlTagReader<'a> {
    /// Create a reader over raw document bytes.
    pub fn new(input: &'a [u8]) -> Self {
        let mut reader = Reader::from_reader(input);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            reader,
            current: None,
            name: String::new(),
            attributes: Vec::new(),
            depth: 0,
            seen_root: false,
            finished: false,
        }
    }

    /// Create a reader over a document string.
    pub fn from_text(input: &'a str) -> Self {
        Self::new(input.as_bytes())
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn read(&mut self) -> Result<Event<'a>, XmlError> {
        let position = self.position();
        self.reader
            .read_event()
            .map_err(|source| XmlError::Syntax { position, source })
    }

    fn decode_name(&self, name: LocalName<'_>) -> Result<String, XmlError> {
        std::str::from_utf8(name.as_ref())
            .map(str::to_string)
            .map_err(|_| XmlError::Encoding {
                position: self.position(),
            })
    }

    fn enter(&mut self, start: &BytesStart<'_>) -> Result<(), XmlError> {
        let name = self.decode_name(start.local_name())?;
        let mut attributes = Vec::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|source| XmlError::Attribute {
                position: self.position(),
                source,
            })?;
            let key = self.decode_name(attr.key.local_name())?;
            let value = attr
                .unescape_value()
                .map_err(|source| XmlError::Syntax {
                    position: self.position(),
                    source,
                })?
                .into_owned();
            check_chars(&value, self.position())?;
            attributes.push((key, value));
        }

        self.name = name;
        self.attributes = attributes;
        self.depth += 1;
        self.seen_root = true;
        self.current = Some(TagEvent::Start);
        Ok(())
    }

    fn leave(&mut self, name: LocalName<'_>) -> Result<(), XmlError> {
        self.name = self.decode_name(name)?;
        self.attributes.clear();
        self.depth = self.depth.saturating_sub(1);
        self.current = Some(TagEvent::End);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), XmlError> {
        if self.depth > 0 {
            return Err(XmlError::UnexpectedEof { open: self.depth });
        }
        if !self.seen_root {
            return Err(XmlError::NoRootElement);
        }
        self.finished = true;
        self.current = Some(TagEvent::Other);
        Ok(())
    }
}

impl TagReader for XmlTagReader<'_> {
    type Error = XmlError;

    fn has_next(&self) -> bool {
        !self.finished
    }

    fn next_event(&mut self) -> Result<TagEvent, XmlError> {
        match self.read()? {
            Event::Start(e) | Event::Empty(e) => {
                self.enter(&e)?;
                Ok(TagEvent::Start)
            }
            Event::End(e) => {
                self.leave(e.local_name())?;
                Ok(TagEvent::End)
            }
            Event::Text(e) => {
                // Unescape even when unused so bad references fail the scan.
                let position = self.position();
                let text = e
                    .unescape()
                    .map_err(|source| XmlError::Syntax { position, source })?;
                check_chars(&text, position)?;
                self.current = Some(TagEvent::Other);
                Ok(TagEvent::Other)
            }
            Event::Eof => {
                self.finish()?;
                Ok(TagEvent::Other)
            }
            _ => {
                self.current = Some(TagEvent::Other);
                Ok(TagEvent::Other)
            }
        }
    }

    fn local_name(&self) -> &str {
        &self.name
    }

    fn element_text(&mut self) -> Result<String, XmlError> {
        if self.current != Some(TagEvent::Start) {
            return Err(XmlError::NotOnStartTag);
        }

        let mut text = String::new();
        loop {
            let position = self.position();
            match self.read()? {
                Event::Text(e) => {
                    let unescaped = e
                        .unescape()
                        .map_err(|source| XmlError::Syntax { position, source })?;
                    check_chars(&unescaped, position)?;
                    text.push_str(&unescaped);
                }
                Event::CData(e) => {
                    let raw = std::str::from_utf8(&e)
                        .map_err(|_| XmlError::Encoding { position })?;
                    check_chars(raw, position)?;
                    text.push_str(raw);
                }
                Event::End(e) => {
                    self.leave(e.local_name())?;
                    return Ok(text);
                }
                Event::Start(e) | Event::Empty(e) => {
                    return Err(XmlError::UnexpectedElement {
                        element: self.name.clone(),
                        child: self.decode_name(e.local_name())?,
                        position,
                    });
                }
                Event::Eof => {
                    return Err(XmlError::UnexpectedEof { open: self.depth });
                }
                // Comments and processing instructions are skipped.
                _ => {}
            }
        }
    }

    fn attribute(&self, name: &str) -> Option<String> {
        if self.current != Some(TagEvent::Start) {
            return None;
        }
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
