//! Heading-hierarchical auto-numbering.
//!
//! One pass over the document maintains a counter array keyed by heading
//! depth and assigns every numberable item (equation, figure, callout) the
//! next tag in heading + appearance order. `max_depth` counts tag
//! components, trailing item counter included, so the heading prefix has
//! `max_depth - 1` counter slots; headings deeper than that clamp to the
//! deepest slot and increment it. Every heading resets the item counter.
//!
//! The pass produces the rewritten document text and an ordered old→new
//! tag map for citation propagation. Only the first occurrence of an old
//! tag maps to a new one; later items carrying the same old tag are still
//! renumbered structurally but contribute no mapping, so a single rename
//! target stays unambiguous.

use std::collections::HashSet;

use itertools::Itertools;
use tracing::debug;

use crate::config::{NumberingMode, Settings};
use crate::error::{Error, Result};
use crate::parse::equation::{LABEL_RE, TAG_RE};
use crate::parse::{callout, equation, figure, EntityKind, EntityMatch};
use crate::scanner::LineScanner;

/// Counter state for one numbering run. Mutated top-to-bottom over a single
/// document and discarded afterwards.
#[derive(Debug)]
pub struct NumberingState {
    /// Heading-prefix counters, `max_depth - 1` slots.
    level_counters: Vec<u32>,
    /// Items before the first heading get their own monotonic counter.
    pre_heading_counter: u32,
    /// Item counter under the current heading; reset on every heading.
    post_heading_counter: u32,
    /// Raw marker levels of still-open ancestors, relative mode only.
    open_levels: Vec<usize>,
    heading_seen: bool,
}

impl NumberingState {
    pub fn new(settings: &Settings) -> NumberingState {
        NumberingState {
            level_counters: vec![0; settings.max_depth.saturating_sub(1)],
            pre_heading_counter: 0,
            post_heading_counter: 0,
            open_levels: Vec::new(),
            heading_seen: false,
        }
    }

    /// Advances the counters for a heading with the given raw marker count.
    pub fn visit_heading(&mut self, raw_level: usize, settings: &Settings) {
        let depth = match settings.numbering_mode {
            NumberingMode::Relative => {
                // Logical nesting level from the prior heading sequence:
                // one deeper than the closest strictly-shallower ancestor.
                while self
                    .open_levels
                    .last()
                    .is_some_and(|&open| open >= raw_level)
                {
                    self.open_levels.pop();
                }
                self.open_levels.push(raw_level);
                self.open_levels.len()
            }
            NumberingMode::Absolute => raw_level,
        };

        self.heading_seen = true;
        self.post_heading_counter = 0;

        let slots = self.level_counters.len();
        let clamped = depth.min(slots);
        if clamped == 0 {
            return;
        }

        self.level_counters[clamped - 1] += 1;
        for counter in &mut self.level_counters[clamped..] {
            *counter = 0;
        }
        if settings.numbering_mode == NumberingMode::Absolute {
            // Skipped heading levels are back-filled to 1 and count as
            // visited for later siblings at that level.
            for counter in &mut self.level_counters[..clamped - 1] {
                if *counter == 0 {
                    *counter = 1;
                }
            }
        }
    }

    /// The tag for the next numbered item, advancing the item counter.
    pub fn next_tag(&mut self, settings: &Settings) -> String {
        if !self.heading_seen {
            self.pre_heading_counter += 1;
            return format!(
                "{}{}{}",
                settings.global_prefix, settings.no_heading_prefix, self.pre_heading_counter
            );
        }

        self.post_heading_counter += 1;
        let prefix = self
            .level_counters
            .iter()
            .filter(|&&counter| counter != 0)
            .join(&settings.delimiter);
        if prefix.is_empty() {
            format!("{}{}", settings.global_prefix, self.post_heading_counter)
        } else {
            format!(
                "{}{}{}{}",
                settings.global_prefix, prefix, settings.delimiter, self.post_heading_counter
            )
        }
    }
}

/// One item's tag assignment from a numbering run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub kind: EntityKind,
    pub old: Option<String>,
    pub new: String,
    pub line: usize,
}

/// A numbering run's outputs: the rewritten text and the ordered old→new
/// pairs that drive citation propagation.
#[derive(Debug, Clone)]
pub struct AutoNumberOutcome {
    pub text: String,
    pub changes: Vec<TagChange>,
}

impl AutoNumberOutcome {
    /// The (old, new) pairs usable for renaming: items that had a tag and
    /// whose tag actually changed, first occurrence of each old tag only.
    pub fn rename_pairs(&self) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        self.changes
            .iter()
            .filter_map(|change| {
                let old = change.old.as_ref()?;
                if old == &change.new || !seen.insert(old.clone()) {
                    return None;
                }
                Some((old.clone(), change.new.clone()))
            })
            .collect()
    }
}

pub struct AutoNumberEngine<'a> {
    settings: &'a Settings,
}

impl<'a> AutoNumberEngine<'a> {
    pub fn new(settings: &'a Settings) -> AutoNumberEngine<'a> {
        AutoNumberEngine { settings }
    }

    /// Renumbers every equation, figure, and callout in the document and
    /// returns the rewritten text plus the tag map. Deterministic: equal
    /// input and configuration give equal output.
    pub fn renumber(&self, text: &str) -> Result<AutoNumberOutcome> {
        let items = collect_items(text, self.settings);
        let mut lines: Vec<String> = text.lines().map(String::from).collect();

        let mut scanner = LineScanner::new();
        let mut state = NumberingState::new(self.settings);
        let mut changes = Vec::with_capacity(items.len());
        let mut pending = items.iter().peekable();

        for (index, line) in text.lines().enumerate() {
            let scanned = scanner.advance(line);
            if let Some(heading) = &scanned.heading {
                state.visit_heading(heading.level, self.settings);
            }
            while pending
                .next_if(|(_, item)| item.line_start == index)
                .map(|(kind, item)| -> Result<()> {
                    let new = state.next_tag(self.settings);
                    rewrite_item(&mut lines, *kind, item, &new, self.settings)?;
                    changes.push(TagChange {
                        kind: *kind,
                        old: item.tag.clone(),
                        new,
                        line: item.line_start,
                    });
                    Ok(())
                })
                .transpose()?
                .is_some()
            {}
        }

        debug!("renumbered {} items", changes.len());
        let mut out = lines.join("\n");
        if text.ends_with('\n') {
            out.push('\n');
        }
        Ok(AutoNumberOutcome { text: out, changes })
    }
}

/// All numberable items in appearance order.
pub(crate) fn collect_items(text: &str, settings: &Settings) -> Vec<(EntityKind, EntityMatch)> {
    equation::parse(text)
        .into_iter()
        .map(|m| (EntityKind::Equation, m))
        .chain(
            figure::parse(text, settings)
                .into_iter()
                .map(|m| (EntityKind::Figure, m)),
        )
        .chain(
            callout::parse(text, settings)
                .into_iter()
                .map(|m| (EntityKind::Callout, m)),
        )
        .sorted_by_key(|(_, m)| m.line_start)
        .collect()
}

pub(crate) fn rewrite_item(
    lines: &mut [String],
    kind: EntityKind,
    item: &EntityMatch,
    new_tag: &str,
    settings: &Settings,
) -> Result<()> {
    match kind {
        EntityKind::Equation => rewrite_equation(lines, item, new_tag),
        EntityKind::Figure => rewrite_figure(lines, item, new_tag, settings),
        EntityKind::Callout => rewrite_callout(lines, item, new_tag, settings),
    }
}

/// Replaces the first tag wrapper in the block (either syntax, preserving
/// it), or inserts a `\tag{}` before the closing delimiter when the block
/// has none.
fn rewrite_equation(lines: &mut [String], item: &EntityMatch, new_tag: &str) -> Result<()> {
    for line in &mut lines[item.line_start..=item.line_end] {
        let tag_at = TAG_RE.find(line).map(|m| m.range());
        let label_at = LABEL_RE.find(line).map(|m| m.range());
        let (range, replacement) = match (tag_at, label_at) {
            (Some(t), Some(l)) if t.start <= l.start => (t, format!("\\tag{{{new_tag}}}")),
            (Some(_), Some(l)) => (l, format!("#label(\"{new_tag}\")")),
            (Some(t), None) => (t, format!("\\tag{{{new_tag}}}")),
            (None, Some(l)) => (l, format!("#label(\"{new_tag}\")")),
            (None, None) => continue,
        };
        line.replace_range(range, &replacement);
        return Ok(());
    }

    // No wrapper anywhere in the block: insert before the closing `$$`, or
    // append when the block is unclosed at end-of-file.
    let last = &mut lines[item.line_end];
    match last.rfind("$$") {
        Some(pos) if !(item.line_start == item.line_end && pos < 2) => {
            let before = last[..pos].trim_end();
            let glue = if before.is_empty() { "" } else { " " };
            *last = format!("{before}{glue}\\tag{{{new_tag}}} {}", &last[pos..]);
        }
        _ => {
            last.push_str(&format!(" \\tag{{{new_tag}}}"));
        }
    }
    Ok(())
}

fn rewrite_figure(
    lines: &mut [String],
    item: &EntityMatch,
    new_tag: &str,
    settings: &Settings,
) -> Result<()> {
    let line = &mut lines[item.line_start];
    if let Some(old) = &item.tag {
        let needle = format!("{}{}", settings.figure_prefix, old);
        let pos = line.find(&needle).ok_or_else(|| {
            Error::Invariant(format!(
                "figure tag `{old}` vanished from line {}",
                item.line_start
            ))
        })?;
        line.replace_range(
            pos..pos + needle.len(),
            &format!("{}{}", settings.figure_prefix, new_tag),
        );
        return Ok(());
    }

    let segment = format!("|{}{}", settings.figure_prefix, new_tag);
    if let Some(pos) = line.rfind("]]") {
        line.insert_str(pos, &segment);
    } else if let Some(pos) = line.find("](") {
        line.insert_str(pos, &segment);
    } else {
        return Err(Error::Invariant(format!(
            "figure line {} lost its image syntax",
            item.line_start
        )));
    }
    Ok(())
}

/// Rewrites the tag inside a callout's `[!<prefix><tag>]` header, keeping
/// whichever configured prefix the header uses.
fn rewrite_callout(
    lines: &mut [String],
    item: &EntityMatch,
    new_tag: &str,
    settings: &Settings,
) -> Result<()> {
    let line = &mut lines[item.line_start];
    let open = line.find("[!").ok_or_else(|| {
        Error::Invariant(format!("callout header vanished from line {}", item.line_start))
    })?;
    let close = line[open..].find(']').map(|i| open + i).ok_or_else(|| {
        Error::Invariant(format!("unclosed callout header on line {}", item.line_start))
    })?;

    let inner = line[open + 2..close].trim();
    let prefix = settings
        .callout_prefixes_by_length()
        .into_iter()
        .find(|p| inner.starts_with(p))
        .ok_or_else(|| {
            Error::Invariant(format!(
                "callout header on line {} matches no configured prefix",
                item.line_start
            ))
        })?
        .to_string();

    line.replace_range(open..close + 1, &format!("[!{prefix}{new_tag}]"));
    Ok(())
}
