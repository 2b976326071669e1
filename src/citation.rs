//! Continuous-range notation and cross-file tag handling.
//!
//! A run of consecutive same-prefix tags compresses to `first~last`
//! (`1.1, 1.2, 1.3` → `1.1~3`); expansion is the literal inverse. A
//! cross-file tag `3^1.2` names tag `1.2` in whatever document footnote
//! `3` of the citing file links to; the actual cache lookup lives in
//! [`crate::engine`], this module only takes the notation apart.
//!
//! Everything here is total: malformed ranges and unknown shapes pass
//! through unchanged rather than erroring, so a batch never aborts on one
//! odd tag.

use itertools::Itertools;

use crate::config::Settings;

/// Splits `<footnoteIndex><fileDelimiter><localTag>` into its halves.
/// Local tags return `None`.
pub fn split_cross_file<'a>(tag: &'a str, settings: &Settings) -> Option<(&'a str, &'a str)> {
    let (index, local) = tag.split_once(settings.file_delimiter.as_str())?;
    let index = index.trim();
    let local = local.trim();
    if index.is_empty() || local.is_empty() {
        return None;
    }
    Some((index, local))
}

/// A tag's numeric tail: everything before the trailing digit run, plus
/// the run's value. `None` when the tag does not end in digits.
fn split_trailing_number(tag: &str) -> Option<(&str, u64)> {
    let bytes = tag.as_bytes();
    let mut start = bytes.len();
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == bytes.len() {
        return None;
    }
    let number = tag[start..].parse().ok()?;
    Some((&tag[..start], number))
}

/// Whether a tag may participate in a range: local, not already a range,
/// and its numeric tail sits behind a configured numeric delimiter (or no
/// prefix at all).
fn combinable<'a>(tag: &'a str, settings: &Settings) -> Option<(&'a str, u64)> {
    if tag.contains(settings.file_delimiter.as_str())
        || tag.contains(settings.range_symbol.as_str())
    {
        return None;
    }
    let (prefix, number) = split_trailing_number(tag)?;
    let behind_delimiter = prefix.is_empty()
        || prefix
            .chars()
            .last()
            .is_some_and(|c| settings.numeric_delimiters.contains(c));
    behind_delimiter.then_some((prefix, number))
}

/// Collapses maximal runs of consecutive same-prefix tags into range
/// notation. Runs of length 1 and non-combinable tags pass through, so the
/// operation is idempotent.
pub fn compress_tags(tags: &[String], settings: &Settings) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    let mut run: Option<(&str, u64, u64, &str)> = None; // prefix, first, last, first tag

    let mut flush = |run: &mut Option<(&str, u64, u64, &str)>, out: &mut Vec<String>| {
        if let Some((_, first, last, first_tag)) = run.take() {
            if first == last {
                out.push(first_tag.to_string());
            } else {
                out.push(format!("{first_tag}{}{last}", settings.range_symbol));
            }
        }
    };

    for tag in tags {
        match (combinable(tag, settings), &mut run) {
            (Some((prefix, number)), Some((run_prefix, _, last, _)))
                if prefix == *run_prefix && number == *last + 1 =>
            {
                *last = number;
            }
            (Some((prefix, number)), _) => {
                flush(&mut run, &mut out);
                run = Some((prefix, number, number, tag));
            }
            (None, _) => {
                flush(&mut run, &mut out);
                out.push(tag.clone());
            }
        }
    }
    flush(&mut run, &mut out);
    out
}

/// Expands range notation back into the tag run it stands for. Returns the
/// input alone when the tag carries no range symbol, either bound is
/// non-numeric, or the bounds are inverted.
pub fn expand_tag(tag: &str, settings: &Settings) -> Vec<String> {
    let Some((left, last)) = tag.split_once(settings.range_symbol.as_str()) else {
        return vec![tag.to_string()];
    };
    let (Some((prefix, first)), Ok(last)) = (split_trailing_number(left), last.trim().parse())
    else {
        return vec![tag.to_string()];
    };
    if first > last {
        return vec![tag.to_string()];
    }
    (first..=last).map(|n| format!("{prefix}{n}")).collect()
}

/// Expands every tag in a citation list, preserving order.
pub fn expand_all(tags: &[String], settings: &Settings) -> Vec<String> {
    tags.iter()
        .flat_map(|tag| expand_tag(tag, settings))
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> Settings {
        Settings::default()
    }

    fn strings(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_adjacent_tags_combine() {
        let compressed = compress_tags(&strings(&["1.1", "1.2"]), &settings());
        assert_eq!(compressed, vec!["1.1~2"]);
    }

    /// Test: a gap breaks the run.
    #[test]
    fn test_non_adjacent_tags_do_not_combine() {
        let compressed = compress_tags(&strings(&["1.1", "1.3"]), &settings());
        assert_eq!(compressed, vec!["1.1", "1.3"]);
    }

    #[test]
    fn test_long_run_and_prefix_change() {
        let compressed = compress_tags(&strings(&["1.1", "1.2", "1.3", "2.1", "2.2"]), &settings());
        assert_eq!(compressed, vec!["1.1~3", "2.1~2"]);
    }

    #[test]
    fn test_cross_file_tags_never_combine() {
        let compressed = compress_tags(&strings(&["3^1.1", "3^1.2"]), &settings());
        assert_eq!(compressed, vec!["3^1.1", "3^1.2"]);
    }

    #[test]
    fn test_compress_is_idempotent() {
        let once = compress_tags(&strings(&["1.1", "1.2", "1.3"]), &settings());
        let twice = compress_tags(&once, &settings());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_expand_inverts_compress() {
        let tags = strings(&["1.1", "1.2", "1.3", "1.4"]);
        let compressed = compress_tags(&tags, &settings());
        assert_eq!(expand_all(&compressed, &settings()), tags);
    }

    #[test]
    fn test_expand_plain_tag_passes_through() {
        assert_eq!(expand_tag("2.3", &settings()), vec!["2.3"]);
    }

    /// Test: inverted or non-numeric bounds come back unchanged.
    #[test]
    fn test_expand_rejects_malformed_ranges() {
        assert_eq!(expand_tag("1.5~2", &settings()), vec!["1.5~2"]);
        assert_eq!(expand_tag("1.a~3", &settings()), vec!["1.a~3"]);
        assert_eq!(expand_tag("1.1~x", &settings()), vec!["1.1~x"]);
    }

    #[test]
    fn test_expand_cross_file_range_keeps_footnote_prefix() {
        assert_eq!(
            expand_tag("3^1.2~4", &settings()),
            vec!["3^1.2", "3^1.3", "3^1.4"]
        );
    }

    #[test]
    fn test_split_cross_file() {
        assert_eq!(split_cross_file("3^1.2", &settings()), Some(("3", "1.2")));
        assert_eq!(split_cross_file("1.2", &settings()), None);
        assert_eq!(split_cross_file("^1.2", &settings()), None);
    }

    #[test]
    fn test_unnumbered_tags_pass_through() {
        let compressed = compress_tags(&strings(&["pythagoras", "1.1", "1.2"]), &settings());
        assert_eq!(compressed, vec!["pythagoras", "1.1~2"]);
    }

    #[test]
    fn test_bare_numeric_tags_combine() {
        let compressed = compress_tags(&strings(&["4", "5", "6"]), &settings());
        assert_eq!(compressed, vec!["4~6"]);
    }
}
