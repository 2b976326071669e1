//! Callout block parsing.
//!
//! A callout is a contiguous run of quote lines at identical depth whose
//! first line carries a `[!<prefix><tag>]` header for one of the configured
//! prefixes (matched longest-first, declaration order on ties). The block
//! terminates on the first line that is not a quote line at the same depth,
//! or at end-of-file. Headers inside code fences are not recognized.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Settings;
use crate::parse::{non_empty_tag, EntityMatch};
use crate::scanner::{LineScanner, ScannedLine};

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[!(?<inner>[^\[\]]+)\](?<meta>.*)$").unwrap());

fn match_prefix<'a>(inner: &str, settings: &'a Settings) -> Option<(&'a str, Option<String>)> {
    for prefix in settings.callout_prefixes_by_length() {
        if let Some(rest) = inner.strip_prefix(prefix) {
            return Some((prefix, non_empty_tag(rest)));
        }
    }
    None
}

struct OpenBlock {
    start: usize,
    end: usize,
    depth: u32,
    tag: Option<String>,
    raw_lines: Vec<String>,
    content_lines: Vec<String>,
}

impl OpenBlock {
    fn finish(self) -> EntityMatch {
        EntityMatch {
            raw_text: self.raw_lines.join("\n"),
            content: self.content_lines.join("\n").trim().to_string(),
            tag: self.tag,
            line_start: self.start,
            line_end: self.end,
            in_quote: true,
            quote_depth: self.depth,
        }
    }
}

fn try_open(scanned: &ScannedLine, index: usize, settings: &Settings) -> Option<OpenBlock> {
    if !scanned.is_live() || scanned.quote_depth == 0 {
        return None;
    }
    let trimmed = scanned.cleaned.trim();
    let captures = HEADER_RE.captures(trimmed)?;
    let inner = captures["inner"].trim();
    let (_, tag) = match_prefix(inner, settings)?;

    let meta = captures["meta"].trim();
    let meta = meta.strip_prefix('|').unwrap_or(meta).trim();
    let content_lines = if meta.is_empty() {
        Vec::new()
    } else {
        vec![meta.to_string()]
    };

    Some(OpenBlock {
        start: index,
        end: index,
        depth: scanned.quote_depth,
        tag,
        raw_lines: vec![trimmed.to_string()],
        content_lines,
    })
}

/// Parses every callout block in the document, in appearance order.
pub fn parse(text: &str, settings: &Settings) -> Vec<EntityMatch> {
    let mut scanner = LineScanner::new();
    let mut matches = Vec::new();
    let mut open: Option<OpenBlock> = None;

    for (index, line) in text.lines().enumerate() {
        let scanned = scanner.advance(line);

        if let Some(ref mut block) = open {
            // Continuation requires a quote line at the exact block depth.
            // Code fences inside the quote are still part of the run.
            if scanned.quote_depth == block.depth {
                block.end = index;
                block.raw_lines.push(scanned.cleaned.clone());
                block.content_lines.push(scanned.cleaned.clone());
                continue;
            }
            matches.push(open.take().unwrap().finish());
        }

        open = try_open(&scanned, index, settings);
    }

    if let Some(block) = open {
        matches.push(block.finish());
    }

    matches
}
