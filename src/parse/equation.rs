//! Equation block parsing.
//!
//! Equations are `$$ ... $$` spans, either fully inline on one line or
//! fenced across several. The tag is the first `\tag{...}` or
//! `#label("...")` occurrence in the block body; the body used for
//! numbering and citation previews excludes the tag wrapper, while
//! `raw_text` preserves it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parse::{non_empty_tag, EntityMatch};
use crate::scanner::LineScanner;

pub(crate) static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\tag\{(?<tag>[^{}]*)\}").unwrap());

pub(crate) static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"#label\("(?<tag>[^"]*)"\)"#).unwrap());

/// Extracts the first tag wrapper (either syntax, whichever occurs first)
/// from a block body. Returns the tag and the body with the wrapper
/// removed. Empty captures yield no tag but still strip the wrapper.
fn extract_tag(body: &str) -> (Option<String>, String) {
    let tag_match = TAG_RE.captures(body);
    let label_match = LABEL_RE.captures(body);

    let first = match (&tag_match, &label_match) {
        (Some(t), Some(l)) => {
            if t.get(0).map(|m| m.start()) <= l.get(0).map(|m| m.start()) {
                tag_match.as_ref()
            } else {
                label_match.as_ref()
            }
        }
        (Some(_), None) => tag_match.as_ref(),
        (None, Some(_)) => label_match.as_ref(),
        (None, None) => None,
    };

    match first {
        Some(captures) => {
            let tag = captures.name("tag").and_then(|m| non_empty_tag(m.as_str()));
            let full = captures.get(0).map(|m| m.range()).unwrap_or(0..0);
            let mut stripped = String::with_capacity(body.len());
            stripped.push_str(&body[..full.start]);
            stripped.push_str(&body[full.end..]);
            (tag, stripped)
        }
        None => (None, body.to_string()),
    }
}

fn finish(raw_lines: &[String], start: usize, end: usize, quote_depth: u32) -> EntityMatch {
    let raw_text = raw_lines.join("\n");

    // Body without the $$ delimiters.
    let mut body = raw_text.trim().to_string();
    if let Some(rest) = body.strip_prefix("$$") {
        body = rest.to_string();
    }
    if let Some(rest) = body.strip_suffix("$$") {
        body = rest.to_string();
    }

    let (tag, content) = extract_tag(&body);

    EntityMatch {
        raw_text,
        content: content.trim().to_string(),
        tag,
        line_start: start,
        line_end: end,
        in_quote: quote_depth > 0,
        quote_depth,
    }
}

/// Parses every equation in the document, in appearance order. An equation
/// block left unclosed at end-of-file is still emitted, ending at the last
/// line.
pub fn parse(text: &str) -> Vec<EntityMatch> {
    let mut scanner = LineScanner::new();
    let mut matches = Vec::new();

    let mut open: Option<(usize, u32, Vec<String>)> = None;
    let mut last_index = 0;

    for (index, line) in text.lines().enumerate() {
        last_index = index;
        let scanned = scanner.advance(line);

        if let Some((start, depth, ref mut buffer)) = open {
            buffer.push(scanned.cleaned.clone());
            if scanned.equation_end {
                matches.push(finish(buffer, start, index, depth));
                open = None;
            }
            continue;
        }

        if !scanned.is_live() {
            continue;
        }

        if scanned.single_line_equation.is_some() {
            matches.push(finish(
                std::slice::from_ref(&scanned.cleaned),
                index,
                index,
                scanned.quote_depth,
            ));
        } else if scanned.equation_start {
            open = Some((index, scanned.quote_depth, vec![scanned.cleaned.clone()]));
        }
    }

    if let Some((start, depth, buffer)) = open {
        matches.push(finish(&buffer, start, last_index, depth));
    }

    matches
}
