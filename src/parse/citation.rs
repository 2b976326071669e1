//! Citation parsing.
//!
//! A citation is a `\ref{<prefix><tag>[, <tag>]*}` call inside a single
//! inline math span (`$...$`). The first component must carry the
//! configured citation prefix; components may be continuous ranges
//! (`1.1~3`) or cross-file tags (`3^1.2`), both handled downstream by
//! [`crate::citation`]. The rename service consumes these records to find
//! every citation of a tag without re-reading file contents.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::Settings;
use crate::scanner::LineScanner;

static CITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$[^$]*?(?<refcall>\\ref\{(?<inner>[^{}]*)\})[^$]*?\$").unwrap()
});

/// One `\ref{...}` citation occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// The exact `\ref{...}` text, used for literal replacement.
    pub raw_ref: String,
    /// Text between the braces, unsplit and unnormalized.
    pub inner: String,
    /// Tag components with the citation prefix stripped and whitespace
    /// trimmed; ranges and cross-file tags are kept as written.
    pub tags: Vec<String>,
    /// Zero-based line of the containing math span.
    pub line: usize,
    pub in_quote: bool,
    pub quote_depth: u32,
}

impl Citation {
    /// Whether any component cites `tag` literally (ranges unexpanded).
    pub fn cites(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag.trim())
    }
}

/// Splits an inner tag list into prefix-stripped components. Returns `None`
/// when the first component does not carry the citation prefix, i.e. the
/// `\ref` belongs to someone else.
fn components(inner: &str, settings: &Settings) -> Option<Vec<String>> {
    let mut split = inner.split(',');
    let first = split.next()?.trim();
    let first = first.strip_prefix(settings.citation_prefix.as_str())?;

    let mut tags = vec![first.trim().to_string()];
    for component in split {
        let component = component.trim();
        let component = component
            .strip_prefix(settings.citation_prefix.as_str())
            .unwrap_or(component);
        tags.push(component.trim().to_string());
    }
    Some(tags)
}

/// Parses every citation in the document, in appearance order.
pub fn parse(text: &str, settings: &Settings) -> Vec<Citation> {
    let mut scanner = LineScanner::new();
    let mut citations = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let scanned = scanner.advance(line);
        if !scanned.is_live() || scanned.context.in_equation_block {
            continue;
        }

        for captures in CITE_RE.captures_iter(&scanned.cleaned) {
            let inner = &captures["inner"];
            let Some(tags) = components(inner, settings) else {
                continue;
            };
            citations.push(Citation {
                raw_ref: captures["refcall"].to_string(),
                inner: inner.to_string(),
                tags,
                line: index,
                in_quote: scanned.quote_depth > 0,
                quote_depth: scanned.quote_depth,
            });
        }
    }

    citations
}
