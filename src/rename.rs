//! Vault-wide tag rename propagation.
//!
//! Given a source file and a set of old→new tag pairs, the service rewrites
//! the tags' definition sites in the source file and every citation of the
//! old tags across the vault. The vault scan is bounded by the citation
//! cache: cached citation lists decide which files have hits, only files
//! with hits are read from storage, and only files where at least one
//! replacement occurred are written back.
//!
//! The write phase is not transactional. A failed write is logged and
//! skipped; files already written stay renamed, and the returned
//! [`TagRenameResult`] is the ground truth of what succeeded.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::DocumentCache;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::numbering;
use crate::parse::{citation, Citation};
use crate::store::DocumentStore;

/// What to do when another citation in the vault already uses a tag that a
/// rename would introduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Leave pre-existing citations of the new tag untouched.
    #[default]
    Keep,
    /// Remove the pre-existing citing components.
    Delete,
    /// Refuse the whole rename before touching any file.
    Abort,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    pub conflict_policy: ConflictPolicy,
    /// Pairs whose new tag is empty delete citations of the old tag
    /// instead of renaming them.
    pub delete_unused: bool,
}

/// Report of one rename operation; per-file counts are citation-component
/// replacements (deletions included).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagRenameResult {
    pub total_files_changed: usize,
    pub total_citations_changed: usize,
    pub details: HashMap<PathBuf, usize>,
}

impl TagRenameResult {
    fn record(&mut self, path: &Path, replacements: usize) {
        self.total_files_changed += 1;
        self.total_citations_changed += replacements;
        self.details.insert(path.to_path_buf(), replacements);
    }
}

pub struct TagRenameService<'a, S: DocumentStore> {
    store: &'a S,
    citations: &'a DocumentCache<Citation, S>,
    settings: &'a Settings,
}

impl<'a, S: DocumentStore> TagRenameService<'a, S> {
    pub fn new(
        store: &'a S,
        citations: &'a DocumentCache<Citation, S>,
        settings: &'a Settings,
    ) -> TagRenameService<'a, S> {
        TagRenameService {
            store,
            citations,
            settings,
        }
    }

    /// Renames `pairs` defined in `source` across the vault.
    pub async fn rename(
        &self,
        source: &Path,
        pairs: &[(String, String)],
        options: RenameOptions,
    ) -> Result<TagRenameResult> {
        let mut renames: HashMap<String, String> = HashMap::new();
        let mut deletions: HashSet<String> = HashSet::new();
        for (old, new) in pairs {
            let (old, new) = (old.trim(), new.trim());
            if old.is_empty() || old == new {
                continue;
            }
            if new.is_empty() {
                if options.delete_unused {
                    deletions.insert(old.to_string());
                }
            } else {
                renames.insert(old.to_string(), new.to_string());
            }
        }
        if renames.is_empty() && deletions.is_empty() {
            return Ok(TagRenameResult::default());
        }

        let conflicts = match options.conflict_policy {
            ConflictPolicy::Keep => HashSet::new(),
            _ => self.find_conflicts(&renames, source),
        };
        if options.conflict_policy == ConflictPolicy::Abort {
            if let Some(tag) = conflicts.iter().next() {
                return Err(Error::DuplicateTag(tag.clone()));
            }
        }
        let edit = Edit {
            renames: &renames,
            deletions: &deletions,
            conflicts: &conflicts,
            settings: self.settings,
        };

        let mut result = TagRenameResult::default();
        self.rewrite_source(source, &edit, &mut result).await;

        for path in self.citations.keys() {
            if path == source {
                continue;
            }
            let Some(cached) = self.citations.peek(&path) else {
                continue;
            };
            if !cached.iter().any(|c| edit.touches(c)) {
                continue;
            }
            self.rewrite_citations_in(&path, &edit, &mut result).await;
        }

        debug!(
            "rename touched {} files, {} citations",
            result.total_files_changed, result.total_citations_changed
        );
        Ok(result)
    }

    /// New tags already cited somewhere in the vault before this rename.
    fn find_conflicts(&self, renames: &HashMap<String, String>, source: &Path) -> HashSet<String> {
        let new_tags: HashSet<&String> = renames.values().collect();
        let mut conflicts = HashSet::new();
        for path in self.citations.keys() {
            let Some(cached) = self.citations.peek(&path) else {
                continue;
            };
            for citation in &cached {
                for tag in &citation.tags {
                    if new_tags.contains(tag) {
                        debug!(
                            "tag `{tag}` already cited in {} (from {})",
                            path.display(),
                            source.display()
                        );
                        conflicts.insert(tag.clone());
                    }
                }
            }
        }
        conflicts
    }

    /// Rewrites both the definition sites and the citations in the source
    /// file, in one read-modify-write.
    async fn rewrite_source(&self, source: &Path, edit: &Edit<'_>, result: &mut TagRenameResult) {
        let Some(text) = self.store.read_file(source).await else {
            warn!("rename source {} is unreadable", source.display());
            return;
        };
        let mut lines: Vec<String> = text.lines().map(String::from).collect();

        let mut changed = false;
        for (kind, item) in numbering::collect_items(&text, self.settings) {
            let Some(new) = item.tag.as_deref().and_then(|t| edit.renames.get(t)) else {
                continue;
            };
            match numbering::rewrite_item(&mut lines, kind, &item, new, self.settings) {
                Ok(()) => changed = true,
                Err(err) => warn!("definition rewrite failed in {}: {err}", source.display()),
            }
        }

        let replacements = apply_to_lines(&mut lines, &citation::parse(&text, self.settings), edit);
        if replacements > 0 {
            changed = true;
        }
        if !changed {
            return;
        }

        let new_text = rejoin(&text, lines);
        match self.store.write_file(source, &new_text).await {
            Ok(()) => {
                self.citations.delete(source);
                result.record(source, replacements);
            }
            Err(err) => warn!("failed to write {}: {err}", source.display()),
        }
    }

    async fn rewrite_citations_in(
        &self,
        path: &Path,
        edit: &Edit<'_>,
        result: &mut TagRenameResult,
    ) {
        let Some(text) = self.store.read_file(path).await else {
            warn!("cached file {} is unreadable, dropping entry", path.display());
            self.citations.delete(path);
            return;
        };

        // The cache entry may lag the file on disk; rewrite against a
        // fresh parse of what we actually read.
        let citations = citation::parse(&text, self.settings);
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        let replacements = apply_to_lines(&mut lines, &citations, edit);
        if replacements == 0 {
            return;
        }

        let new_text = rejoin(&text, lines);
        match self.store.write_file(path, &new_text).await {
            Ok(()) => {
                self.citations.delete(path);
                result.record(path, replacements);
            }
            Err(err) => warn!("failed to write {}: {err}", path.display()),
        }
    }
}

/// One rename operation's compiled edit set.
struct Edit<'a> {
    renames: &'a HashMap<String, String>,
    deletions: &'a HashSet<String>,
    conflicts: &'a HashSet<String>,
    settings: &'a Settings,
}

impl Edit<'_> {
    fn touches(&self, citation: &Citation) -> bool {
        citation.tags.iter().any(|tag| {
            self.renames.contains_key(tag)
                || self.deletions.contains(tag)
                || self.conflicts.contains(tag)
        })
    }
}

/// Applies the edit to every affected citation, mutating lines in place.
/// Returns the number of replaced or deleted components.
fn apply_to_lines(lines: &mut [String], citations: &[Citation], edit: &Edit<'_>) -> usize {
    let mut replacements = 0;
    for citation in citations {
        if !edit.touches(citation) {
            continue;
        }
        let Some(line) = lines.get_mut(citation.line) else {
            continue;
        };
        let (new_inner, count) = rewrite_inner(&citation.inner, edit);
        replacements += count;

        let new_ref = if new_inner.trim().is_empty() {
            String::new()
        } else {
            format!("\\ref{{{new_inner}}}")
        };
        *line = line.replace(&citation.raw_ref, &new_ref);
    }
    replacements
}

/// Rewrites one citation's brace interior, segment by segment. Each kept
/// segment preserves its own whitespace and prefix bytes, so renaming
/// A→B then B→A restores the original text exactly.
fn rewrite_inner(inner: &str, edit: &Edit<'_>) -> (String, usize) {
    let prefix = edit.settings.citation_prefix.as_str();
    let mut count = 0;

    let mut kept: Vec<String> = Vec::new();
    for segment in inner.split(',') {
        let trimmed = segment.trim();
        let lead = segment.len() - segment.trim_start().len();
        let core_start = lead + trimmed.strip_prefix(prefix).map_or(0, |_| prefix.len());
        let core_end = lead + trimmed.len();
        let core = &segment[core_start..core_end];

        if edit.deletions.contains(core) || edit.conflicts.contains(core) {
            count += 1;
            continue;
        }
        match edit.renames.get(core) {
            Some(new) => {
                count += 1;
                kept.push(format!(
                    "{}{new}{}",
                    &segment[..core_start],
                    &segment[core_end..]
                ));
            }
            None => kept.push(segment.to_string()),
        }
    }

    // Deleting the first segment can strip the citation prefix from the
    // list head; the survivor is promoted to head position, dropping the
    // lead whitespace it carried as a later segment.
    if let Some(first) = kept.first_mut() {
        if !first.trim_start().starts_with(prefix) {
            *first = format!("{prefix}{}", first.trim_start());
        }
    }
    (kept.join(","), count)
}

fn rejoin(original: &str, lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    if original.ends_with('\n') {
        text.push('\n');
    }
    text
}
