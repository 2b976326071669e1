//! The engine facade.
//!
//! [`Engine`] owns one [`DocumentCache`] per entity kind, all backed by the
//! same [`DocumentStore`], and exposes the operations the editor layers
//! consume: entity lookup, auto-number previews and rewrites, citation
//! resolution (ranges and cross-file), vault-wide tag renames, and cache
//! control.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{CacheConfig, DocumentCache};
use crate::citation::{expand_all, split_cross_file};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::hash::BlockFingerprint;
use crate::numbering::{AutoNumberEngine, AutoNumberOutcome};
use crate::parse::{
    callout, citation, equation, figure, footnote, Citation, EntityKind, EntityMatch, Footnote,
    FootnoteLink,
};
use crate::rename::{RenameOptions, TagRenameResult, TagRenameService};
use crate::store::{is_markdown, DocumentStore, Notifier, TracingNotifier};

/// A citation target found in some document's cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntity {
    /// The queried tag, as written (range-expanded, cross-file form kept).
    pub tag: String,
    /// The document the entity lives in.
    pub path: PathBuf,
    pub kind: EntityKind,
    pub entity: EntityMatch,
}

pub struct Engine<S: DocumentStore> {
    settings: Settings,
    store: Arc<S>,
    equations: DocumentCache<EntityMatch, S>,
    figures: DocumentCache<EntityMatch, S>,
    callouts: DocumentCache<EntityMatch, S>,
    footnotes: DocumentCache<Footnote, S>,
    citations: DocumentCache<Citation, S>,
    notifier: Box<dyn Notifier>,
}

impl<S: DocumentStore> Engine<S> {
    /// Creates an engine over `store`. Must be called within a tokio
    /// runtime (the caches spawn their sweep tasks here).
    pub fn new(settings: Settings, store: S) -> Engine<S> {
        Engine::with_notifier(settings, store, Box::new(TracingNotifier))
    }

    pub fn with_notifier(settings: Settings, store: S, notifier: Box<dyn Notifier>) -> Engine<S> {
        let store = Arc::new(store);
        let cache_config = CacheConfig::from_settings(&settings);

        let equations = DocumentCache::new(
            Arc::clone(&store),
            cache_config,
            Arc::new(equation::parse),
        );
        let fig_settings = settings.clone();
        let figures = DocumentCache::new(
            Arc::clone(&store),
            cache_config,
            Arc::new(move |text: &str| figure::parse(text, &fig_settings)),
        );
        let call_settings = settings.clone();
        let callouts = DocumentCache::new(
            Arc::clone(&store),
            cache_config,
            Arc::new(move |text: &str| callout::parse(text, &call_settings)),
        );
        let footnotes = DocumentCache::new(
            Arc::clone(&store),
            cache_config,
            Arc::new(footnote::parse),
        );
        let cite_settings = settings.clone();
        let citations = DocumentCache::new(
            Arc::clone(&store),
            cache_config,
            Arc::new(move |text: &str| citation::parse(text, &cite_settings)),
        );

        Engine {
            settings,
            store,
            equations,
            figures,
            callouts,
            footnotes,
            citations,
            notifier,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        self.store.as_ref()
    }

    pub async fn equations(&self, path: &Path) -> Vec<EntityMatch> {
        self.equations.get(path).await
    }

    pub async fn figures(&self, path: &Path) -> Vec<EntityMatch> {
        self.figures.get(path).await
    }

    pub async fn callouts(&self, path: &Path) -> Vec<EntityMatch> {
        self.callouts.get(path).await
    }

    pub async fn footnotes(&self, path: &Path) -> Vec<Footnote> {
        self.footnotes.get(path).await
    }

    pub async fn citations(&self, path: &Path) -> Vec<Citation> {
        self.citations.get(path).await
    }

    pub async fn entities(&self, path: &Path, kind: EntityKind) -> Vec<EntityMatch> {
        match kind {
            EntityKind::Equation => self.equations(path).await,
            EntityKind::Figure => self.figures(path).await,
            EntityKind::Callout => self.callouts(path).await,
        }
    }

    /// Reads every Markdown file under the root and populates the citation
    /// cache. Parsing runs in parallel; the reads stay on the async side.
    pub async fn scan_vault(&self) -> usize {
        let files = self.store.list_markdown_files();
        let mut texts = Vec::with_capacity(files.len());
        for path in &files {
            if let Some(text) = self.store.read_file(path).await {
                texts.push((path.clone(), text));
            }
        }

        let parsed: Vec<(PathBuf, Vec<Citation>)> = texts
            .par_iter()
            .map(|(path, text)| (path.clone(), citation::parse(text, &self.settings)))
            .collect();
        let scanned = parsed.len();
        for (path, citations) in parsed {
            self.citations.set(&path, citations);
        }

        info!("scanned {scanned} files into the citation cache");
        scanned
    }

    /// Renumbers `text` without touching storage: the rewritten text plus
    /// the tag map a caller could apply.
    pub fn auto_number_preview(&self, text: &str) -> Result<AutoNumberOutcome> {
        AutoNumberEngine::new(&self.settings).renumber(text)
    }

    /// Renumbers a file on disk and propagates every changed tag to the
    /// citations across the vault.
    pub async fn renumber_file(&self, path: &Path) -> Result<AutoNumberOutcome> {
        if !is_markdown(path) {
            return Err(Error::NotMarkdown(path.to_path_buf()));
        }
        let Some(text) = self.store.read_file(path).await else {
            return Err(Error::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file unreadable"),
            });
        };

        let outcome = AutoNumberEngine::new(&self.settings).renumber(&text)?;
        if outcome.text != text {
            self.store.write_file(path, &outcome.text).await?;
            self.invalidate(path);
        }

        let pairs = outcome.rename_pairs();
        if !pairs.is_empty() {
            let result = self
                .rename_tags(path, &pairs, RenameOptions::default())
                .await?;
            debug!(
                "renumber of {} propagated {} citation changes",
                path.display(),
                result.total_citations_changed
            );
        }
        Ok(outcome)
    }

    /// Renames tags defined in `path` across the vault. See
    /// [`crate::rename`] for the conflict and deletion semantics.
    pub async fn rename_tags(
        &self,
        path: &Path,
        pairs: &[(String, String)],
        options: RenameOptions,
    ) -> Result<TagRenameResult> {
        let service = TagRenameService::new(self.store.as_ref(), &self.citations, &self.settings);
        let result = service.rename(path, pairs, options).await?;
        for changed in result.details.keys() {
            self.invalidate(changed);
        }
        self.notifier.notify(&format!(
            "Renamed {} citation(s) across {} file(s)",
            result.total_citations_changed, result.total_files_changed
        ));
        Ok(result)
    }

    /// Resolves a citation tag list from `source`. Ranges are expanded
    /// first; tags that resolve to nothing are dropped from the result
    /// rather than aborting the batch.
    pub async fn resolve_citations(&self, tags: &[String], source: &Path) -> Vec<ResolvedEntity> {
        let mut resolved = Vec::new();
        for tag in expand_all(tags, &self.settings) {
            match self.resolve_one(&tag, source).await {
                Some(entity) => resolved.push(entity),
                None => debug!("no match for tag `{tag}` cited from {}", source.display()),
            }
        }
        resolved
    }

    async fn resolve_one(&self, tag: &str, source: &Path) -> Option<ResolvedEntity> {
        let Some((index, local)) = split_cross_file(tag, &self.settings) else {
            return self.lookup_local(tag, source).await;
        };

        let footnotes = self.footnotes.get(source).await;
        let target = match &footnote::find_by_index(&footnotes, index)?.link {
            FootnoteLink::Internal { path, .. } => self.store.resolve_link(path, source)?,
            // External and text footnotes have no vault-local cache.
            _ => return None,
        };
        let mut resolved = self.lookup_local(local, &target).await?;
        resolved.tag = tag.to_string();
        Some(resolved)
    }

    async fn lookup_local(&self, tag: &str, path: &Path) -> Option<ResolvedEntity> {
        let caches = [
            (EntityKind::Equation, &self.equations),
            (EntityKind::Figure, &self.figures),
            (EntityKind::Callout, &self.callouts),
        ];
        for (kind, cache) in caches {
            if let Some(entity) = cache.get(path).await.into_iter().find(|m| m.has_tag(tag)) {
                return Some(ResolvedEntity {
                    tag: tag.to_string(),
                    path: path.to_path_buf(),
                    kind,
                    entity,
                });
            }
        }
        None
    }

    /// Fingerprints an entity's current lines so it can be re-anchored
    /// later. `text` must be the content the entity was parsed from.
    pub fn anchor(&self, text: &str, entity: &EntityMatch) -> BlockFingerprint {
        BlockFingerprint::record(text, entity.line_start, entity.line_end)
    }

    /// Finds a previously anchored block's new starting line in the file's
    /// current content, without re-parsing. `None` when the file is
    /// unreadable or the exact line sequence no longer occurs.
    pub async fn relocate(&self, fingerprint: &BlockFingerprint, path: &Path) -> Option<usize> {
        let text = self.store.read_file(path).await?;
        fingerprint.relocate(&text)
    }

    /// Drops every cache entry for `path`; the next read re-parses.
    pub fn invalidate(&self, path: &Path) {
        self.equations.delete(path);
        self.figures.delete(path);
        self.callouts.delete(path);
        self.footnotes.delete(path);
        self.citations.delete(path);
    }

    pub fn clear_caches(&self) {
        self.equations.clear();
        self.figures.clear();
        self.callouts.clear();
        self.footnotes.clear();
        self.citations.clear();
        self.notifier.notify("Caches cleared");
    }

    /// Shuts every cache down. Idempotent; afterwards all engine reads
    /// return empty and writes are no-ops.
    pub fn destroy(&self) {
        self.equations.destroy();
        self.figures.destroy();
        self.callouts.destroy();
        self.footnotes.destroy();
        self.citations.destroy();
    }
}
