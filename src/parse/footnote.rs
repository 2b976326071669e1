//! Footnote definition parsing.
//!
//! Footnotes are the indirection layer for cross-file citations: a tag
//! `3^1.2` cites tag `1.2` in whatever document footnote `3` links to.
//! A line must begin with `[^` to be considered at all; the body is then
//! matched against three mutually exclusive sub-patterns in order —
//! internal file link, external web link, text-only — first match wins.
//! Footnote-shaped lines matching none of them fall back to a text-only
//! footnote so no line is silently dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::parse::EntityMatch;
use crate::scanner::LineScanner;

static INTERNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\^(?<index>[^\[\]\s]+)\]:\s*\[\[(?<path>[^\[\]|]+)(\|(?<label>[^\[\]]*))?\]\]\s*$")
        .unwrap()
});

static EXTERNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\^(?<index>[^\[\]\s]+)\]:\s*\[(?<label>[^\[\]]*)\]\((?<url>https?://[^\s()]+)\)\s*$")
        .unwrap()
});

static BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\^(?<index>[^\[\]\s]+)\]:\s*(?<text>.*)$").unwrap());

/// What a footnote points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FootnoteLink {
    /// `[^1]: [[path|label]]` or `[^1]: [[path]]`
    Internal { path: String, label: Option<String> },
    /// `[^1]: [label](https://...)` or a bare URL
    External { url: String, label: Option<String> },
    /// Anything else after the colon.
    Text,
}

/// A parsed footnote definition: the generic match record plus the typed
/// link target used by cross-file resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footnote {
    pub entity: EntityMatch,
    pub link: FootnoteLink,
}

impl Footnote {
    pub fn index(&self) -> Option<&str> {
        self.entity.tag.as_deref()
    }
}

/// Looks up a footnote by its index among one file's parsed footnotes.
pub fn find_by_index<'a>(footnotes: &'a [Footnote], index: &str) -> Option<&'a Footnote> {
    footnotes
        .iter()
        .find(|f| f.index().map(str::trim) == Some(index.trim()))
}

fn entity(
    raw: &str,
    index: Option<String>,
    content: String,
    line: usize,
    quote_depth: u32,
) -> EntityMatch {
    EntityMatch {
        raw_text: raw.to_string(),
        content,
        tag: index,
        line_start: line,
        line_end: line,
        in_quote: quote_depth > 0,
        quote_depth,
    }
}

fn classify(raw: &str, line: usize, quote_depth: u32) -> Footnote {
    if let Some(captures) = INTERNAL_RE.captures(raw) {
        let path = captures["path"].trim().to_string();
        let label = captures
            .name("label")
            .map(|m| m.as_str().trim().to_string())
            .filter(|l| !l.is_empty());
        return Footnote {
            entity: entity(
                raw,
                Some(captures["index"].to_string()),
                path.clone(),
                line,
                quote_depth,
            ),
            link: FootnoteLink::Internal { path, label },
        };
    }

    if let Some(captures) = EXTERNAL_RE.captures(raw) {
        let url = captures["url"].to_string();
        let label = Some(captures["label"].trim().to_string()).filter(|l| !l.is_empty());
        return Footnote {
            entity: entity(
                raw,
                Some(captures["index"].to_string()),
                url.clone(),
                line,
                quote_depth,
            ),
            link: FootnoteLink::External { url, label },
        };
    }

    if let Some(captures) = BARE_RE.captures(raw) {
        let text = captures["text"].trim().to_string();
        // A bare URL after the colon is still an external link.
        if text.starts_with("http://") || text.starts_with("https://") {
            let url = text.split_whitespace().next().unwrap_or("").to_string();
            return Footnote {
                entity: entity(
                    raw,
                    Some(captures["index"].to_string()),
                    url.clone(),
                    line,
                    quote_depth,
                ),
                link: FootnoteLink::External { url, label: None },
            };
        }
        return Footnote {
            entity: entity(
                raw,
                Some(captures["index"].to_string()),
                text,
                line,
                quote_depth,
            ),
            link: FootnoteLink::Text,
        };
    }

    // Footnote-shaped but matching nothing above (e.g. no colon): keep it
    // as text-only rather than dropping the line.
    Footnote {
        entity: entity(raw, None, raw.to_string(), line, quote_depth),
        link: FootnoteLink::Text,
    }
}

/// Parses every footnote definition in the document, in appearance order.
pub fn parse(text: &str) -> Vec<Footnote> {
    let mut scanner = LineScanner::new();
    let mut footnotes = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let scanned = scanner.advance(line);
        if !scanned.is_live() || scanned.context.in_equation_block {
            continue;
        }
        // Cheap rejection before any regex work.
        if !scanned.cleaned.starts_with("[^") {
            continue;
        }
        footnotes.push(classify(&scanned.cleaned, index, scanned.quote_depth));
    }

    footnotes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_file_link() {
        let footnotes = parse("[^1]: [[chapters/analysis|Analysis]]");
        assert_eq!(footnotes.len(), 1);
        let f = &footnotes[0];
        assert_eq!(f.index(), Some("1"));
        assert_eq!(
            f.link,
            FootnoteLink::Internal {
                path: "chapters/analysis".to_string(),
                label: Some("Analysis".to_string()),
            }
        );
    }

    #[test]
    fn test_internal_link_without_label() {
        let footnotes = parse("[^ref]: [[notes]]");
        assert_eq!(
            footnotes[0].link,
            FootnoteLink::Internal {
                path: "notes".to_string(),
                label: None,
            }
        );
    }

    #[test]
    fn test_external_labeled_link() {
        let footnotes = parse("[^2]: [paper](https://example.org/paper.pdf)");
        assert_eq!(
            footnotes[0].link,
            FootnoteLink::External {
                url: "https://example.org/paper.pdf".to_string(),
                label: Some("paper".to_string()),
            }
        );
    }

    #[test]
    fn test_bare_url_is_external() {
        let footnotes = parse("[^3]: https://example.org");
        assert_eq!(
            footnotes[0].link,
            FootnoteLink::External {
                url: "https://example.org".to_string(),
                label: None,
            }
        );
    }

    #[test]
    fn test_plain_text_footnote() {
        let footnotes = parse("[^4]: see the appendix");
        assert_eq!(footnotes[0].link, FootnoteLink::Text);
        assert_eq!(footnotes[0].entity.content, "see the appendix");
    }

    /// Test: the internal pattern wins over the text fallback.
    #[test]
    fn test_sub_patterns_tried_in_order() {
        let footnotes = parse("[^5]: [[target]]");
        assert!(matches!(footnotes[0].link, FootnoteLink::Internal { .. }));
    }

    /// Test: footnote-shaped garbage still yields a match, not a drop.
    #[test]
    fn test_malformed_footnote_falls_back() {
        let footnotes = parse("[^6] missing colon");
        assert_eq!(footnotes.len(), 1);
        assert_eq!(footnotes[0].entity.tag, None);
        assert_eq!(footnotes[0].link, FootnoteLink::Text);
    }

    #[test]
    fn test_non_footnote_lines_rejected_cheaply() {
        let footnotes = parse("plain text\n[link]: not a footnote");
        assert!(footnotes.is_empty());
    }

    #[test]
    fn test_footnote_in_code_block_ignored() {
        let footnotes = parse("```\n[^1]: [[target]]\n```");
        assert!(footnotes.is_empty());
    }

    #[test]
    fn test_find_by_index() {
        let footnotes = parse("[^1]: [[a]]\n[^2]: [[b]]");
        assert!(find_by_index(&footnotes, "2").is_some());
        assert!(find_by_index(&footnotes, "3").is_none());
    }
}
