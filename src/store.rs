//! External collaborators: document storage and the user-notice channel.
//!
//! The engine never decides when files exist or how links map to paths; it
//! talks to a [`DocumentStore`] and tolerates absence everywhere (missing
//! files read as `None`, never as errors). Notifications are a one-way
//! side channel the core never blocks on.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// True for paths the caches are allowed to hold.
pub fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("md")
}

/// Vault-relative display form of a path, extension dropped. Used in
/// notifications and reports, never for lookups.
pub fn vault_ref_path(root: &Path, path: &Path) -> Option<String> {
    pathdiff::diff_paths(path, root)
        .and_then(|diff| diff.with_extension("").to_str().map(String::from))
}

/// Abstract document storage. Reading and writing are the engine's only
/// asynchronous boundaries.
#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync + 'static {
    /// Current content of `path`, or `None` when the file is missing or
    /// unreadable.
    async fn read_file(&self, path: &Path) -> Option<String>;

    /// Cheap existence probe; `false` means a read would return `None`.
    fn file_exists(&self, path: &Path) -> bool;

    async fn write_file(&self, path: &Path, text: &str) -> Result<()>;

    /// Every Markdown document under the store's root.
    fn list_markdown_files(&self) -> Vec<PathBuf>;

    /// Resolves a vault-style link (`chapters/analysis`, extension
    /// optional) against the citing file's location, then the root.
    fn resolve_link(&self, link: &str, from: &Path) -> Option<PathBuf>;

    fn root_dir(&self) -> &Path;
}

/// One-way user-visible status channel ("cache cleared", rename summary).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default notifier: forwards messages to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(target: "citator::notify", "{message}");
    }
}

/// Filesystem-backed store rooted at a vault directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> FsStore {
        FsStore { root: root.into() }
    }

    fn candidate_paths(&self, link: &str, from: &Path) -> Vec<PathBuf> {
        let mut link = link.trim().to_string();
        if !link.ends_with(".md") {
            link.push_str(".md");
        }
        let mut candidates = Vec::new();
        if let Some(parent) = from.parent() {
            candidates.push(parent.join(&link));
        }
        candidates.push(self.root.join(&link));
        candidates
    }
}

impl DocumentStore for FsStore {
    async fn read_file(&self, path: &Path) -> Option<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Some(text),
            Err(err) => {
                debug!("read miss for {}: {err}", path.display());
                None
            }
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    async fn write_file(&self, path: &Path, text: &str) -> Result<()> {
        tokio::fs::write(path, text).await.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn list_markdown_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                !e.file_name()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
            })
            .flatten()
            .filter(|e| is_markdown(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect_vec()
    }

    fn resolve_link(&self, link: &str, from: &Path) -> Option<PathBuf> {
        for candidate in self.candidate_paths(link, from) {
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // Obsidian-style fallback: match on file stem anywhere in the vault.
        let stem = link.trim().trim_end_matches(".md");
        let stem = stem.rsplit('/').next().unwrap_or(stem);
        self.list_markdown_files()
            .into_iter()
            .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(stem))
    }

    fn root_dir(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_vault_dir;
    use std::fs;

    #[test]
    fn test_list_markdown_files_skips_hidden_and_foreign() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::write(vault_dir.join("a.md"), "# A").unwrap();
        fs::write(vault_dir.join("b.txt"), "not markdown").unwrap();
        fs::create_dir(vault_dir.join(".hidden")).unwrap();
        fs::write(vault_dir.join(".hidden/c.md"), "# C").unwrap();

        let store = FsStore::new(&vault_dir);
        let files = store.list_markdown_files();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.md"));
    }

    #[test]
    fn test_vault_ref_path_is_relative_without_extension() {
        let root = Path::new("/vault");
        assert_eq!(
            vault_ref_path(root, Path::new("/vault/sub/note.md")).as_deref(),
            Some("sub/note")
        );
        assert_eq!(vault_ref_path(root, Path::new("/vault")).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = FsStore::new(&vault_dir);
        assert_eq!(store.read_file(&vault_dir.join("absent.md")).await, None);
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = FsStore::new(&vault_dir);
        let path = vault_dir.join("doc.md");
        store.write_file(&path, "# Doc").await.unwrap();
        assert_eq!(store.read_file(&path).await.as_deref(), Some("# Doc"));
    }

    #[test]
    fn test_resolve_link_relative_then_root_then_stem() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        fs::create_dir(vault_dir.join("sub")).unwrap();
        fs::write(vault_dir.join("sub/near.md"), "near").unwrap();
        fs::write(vault_dir.join("rooted.md"), "rooted").unwrap();
        fs::write(vault_dir.join("sub/unique-stem.md"), "stem").unwrap();

        let store = FsStore::new(&vault_dir);
        let from = vault_dir.join("sub/citing.md");

        assert!(store
            .resolve_link("near", &from)
            .unwrap()
            .ends_with("sub/near.md"));
        assert!(store
            .resolve_link("rooted", &from)
            .unwrap()
            .ends_with("rooted.md"));
        assert!(store
            .resolve_link("unique-stem", &vault_dir.join("citing.md"))
            .unwrap()
            .ends_with("sub/unique-stem.md"));
        assert_eq!(store.resolve_link("nowhere", &from), None);
    }
}
