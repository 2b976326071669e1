//! Figure (image) line parsing.
//!
//! A figure is recognized only when, after stripping quote markers, the
//! entire trimmed line is an image reference: wikilink (`![[path|...]]`)
//! or markdown-link (`![alt|...](url)`) form with `!` first. Metadata
//! segments after `|` are read left-to-right: `title:` and `desc:` are
//! reserved keys, and the first segment carrying the configured figure
//! prefix is the tag; later prefix-matching segments are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Settings;
use crate::parse::{non_empty_tag, EntityMatch};
use crate::scanner::LineScanner;

static WIKI_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[\[(?<inner>[^\[\]]+)\]\]$").unwrap());

static MD_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[(?<alt>[^\[\]]*)\]\(<?(?<url>[^()<>]+)>?\)$").unwrap());

#[derive(Default)]
struct Metadata {
    tag: Option<String>,
    title: Option<String>,
    desc: Option<String>,
}

fn parse_segments<'a>(segments: impl Iterator<Item = &'a str>, settings: &Settings) -> Metadata {
    let mut meta = Metadata::default();
    for segment in segments {
        let segment = segment.trim();
        if let Some(title) = segment.strip_prefix("title:") {
            meta.title.get_or_insert_with(|| title.trim().to_string());
        } else if let Some(desc) = segment.strip_prefix("desc:") {
            meta.desc.get_or_insert_with(|| desc.trim().to_string());
        } else if meta.tag.is_none() {
            if let Some(tag) = segment.strip_prefix(settings.figure_prefix.as_str()) {
                meta.tag = non_empty_tag(tag);
            }
        }
    }
    meta
}

/// Parses every figure line in the document, in appearance order.
pub fn parse(text: &str, settings: &Settings) -> Vec<EntityMatch> {
    let mut scanner = LineScanner::new();
    let mut matches = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let scanned = scanner.advance(line);
        if !scanned.is_live() || scanned.context.in_equation_block || !scanned.image_line {
            continue;
        }

        let trimmed = scanned.cleaned.trim();
        let (target, meta) = if let Some(captures) = WIKI_IMAGE_RE.captures(trimmed) {
            let inner = &captures["inner"];
            let mut segments = inner.split('|');
            let target = segments.next().unwrap_or_default().trim().to_string();
            (target, parse_segments(segments, settings))
        } else if let Some(captures) = MD_IMAGE_RE.captures(trimmed) {
            let alt = captures["alt"].to_string();
            let target = captures["url"].trim().to_string();
            (target, parse_segments(alt.split('|'), settings))
        } else {
            continue;
        };

        let content = meta
            .title
            .or(meta.desc)
            .unwrap_or_else(|| target.clone());

        matches.push(EntityMatch {
            raw_text: trimmed.to_string(),
            content,
            tag: meta.tag,
            line_start: index,
            line_end: index,
            in_quote: scanned.quote_depth > 0,
            quote_depth: scanned.quote_depth,
        });
    }

    matches
}
