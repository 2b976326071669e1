//! Entity parsers.
//!
//! Each parser walks a document once using [`crate::scanner`], buffers the
//! lines that belong to a block, and emits [`EntityMatch`] records. The
//! parsers share the scanner and differ only in what they recognize once a
//! line is live (not inside a code fence). Parsing is total over arbitrary
//! text: malformed blocks yield `tag: None`, never an error.

use serde::Serialize;

pub mod callout;
pub mod citation;
pub mod equation;
pub mod figure;
pub mod footnote;

pub use citation::Citation;
pub use footnote::{Footnote, FootnoteLink};

/// One parsed equation/figure/callout occurrence. Created fresh on every
/// parse pass of a file and discarded when its cache entry is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityMatch {
    /// The matched text as it appears in the document, delimiters and tag
    /// wrapper included (quote markers stripped).
    pub raw_text: String,
    /// The body used for numbering and citation previews: no delimiters,
    /// no tag wrapper.
    pub content: String,
    pub tag: Option<String>,
    /// Zero-based, inclusive. Equal for single-line matches.
    pub line_start: usize,
    /// Zero-based, inclusive.
    pub line_end: usize,
    pub in_quote: bool,
    pub quote_depth: u32,
}

impl EntityMatch {
    /// Tag equality is trimmed string equality; duplicates are legal.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.as_deref().map(str::trim) == Some(tag.trim())
    }
}

/// The entity kinds served out of the per-file caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Equation,
    Figure,
    Callout,
}

/// Normalizes an extracted tag capture: trimmed, and empty captures become
/// `None` rather than an empty tag.
pub(crate) fn non_empty_tag(capture: &str) -> Option<String> {
    let trimmed = capture.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
