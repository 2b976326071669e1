//! Per-file, time-boxed document caches.
//!
//! Each entity kind owns one [`DocumentCache`] parameterized by a parse
//! strategy (a plain closure, not a subclass hook). `get` serves cached
//! data while it is fresh and otherwise re-parses the file's current
//! content, with at most one concurrent refresh per path: a second caller
//! for the same key awaits the in-flight refresh instead of starting a
//! duplicate. A background sweep evicts stale entries and bounds the map
//! size. `destroy` is idempotent; afterwards every operation is a no-op
//! and late-finishing refreshes discard their results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::Settings;
use crate::store::{is_markdown, DocumentStore};

/// Parse strategy: current file text in, entity list out. Total over
/// arbitrary text.
pub type ParseFn<T> = Arc<dyn Fn(&str) -> Vec<T> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Entries older than this are re-parsed before being served.
    pub ttl: Duration,
    /// Sweep period; entries untouched for this long are evicted.
    pub sweep_interval: Duration,
    /// When exceeded, the oldest half of the map (by last write) goes.
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn from_settings(settings: &Settings) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(settings.cache_update_seconds),
            sweep_interval: Duration::from_secs(settings.cache_clean_seconds),
            max_entries: settings.max_cache_size,
        }
    }
}

/// One file's cached parse output.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub data: Vec<T>,
    pub last_updated: Instant,
}

struct Shared<T> {
    entries: Mutex<HashMap<PathBuf, CachedEntry<T>>>,
    /// Per-key refresh locks; holders are mid-refresh for that path.
    inflight: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
    destroyed: AtomicBool,
    config: CacheConfig,
}

impl<T> Shared<T> {
    fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache mutex poisoned");

        entries.retain(|path, entry| {
            let keep = now.duration_since(entry.last_updated) <= self.config.sweep_interval;
            if !keep {
                trace!("sweeping stale cache entry for {}", path.display());
            }
            keep
        });

        if entries.len() > self.config.max_entries {
            let mut by_age: Vec<(PathBuf, Instant)> = entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.last_updated))
                .collect();
            by_age.sort_by_key(|(_, updated)| *updated);
            let evict = entries.len() / 2;
            for (path, _) in by_age.into_iter().take(evict) {
                entries.remove(&path);
            }
            debug!("cache over capacity, evicted oldest {evict} entries");
        }

        let keys: std::collections::HashSet<PathBuf> = entries.keys().cloned().collect();
        drop(entries);

        // Refresh locks for evicted keys have no waiters worth keeping.
        self.inflight
            .lock()
            .expect("cache mutex poisoned")
            .retain(|path, _| keys.contains(path));
    }
}

/// Generic per-file cache of one entity kind's parse output.
pub struct DocumentCache<T, S> {
    shared: Arc<Shared<T>>,
    store: Arc<S>,
    parse: ParseFn<T>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T, S> DocumentCache<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: DocumentStore,
{
    /// Creates the cache and starts its sweep task. Must be called within
    /// a tokio runtime.
    pub fn new(store: Arc<S>, config: CacheConfig, parse: ParseFn<T>) -> DocumentCache<T, S> {
        let shared = Arc::new(Shared {
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
            config,
        });

        let sweep_shared = Arc::clone(&shared);
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.sweep_interval);
            interval.tick().await; // first tick is immediate
            loop {
                interval.tick().await;
                if sweep_shared.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                sweep_shared.sweep();
            }
        });

        DocumentCache {
            shared,
            store,
            parse,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    fn fresh_data(&self, path: &Path) -> Option<Vec<T>> {
        let entries = self.shared.entries.lock().expect("cache mutex poisoned");
        entries.get(path).and_then(|entry| {
            (entry.last_updated.elapsed() <= self.shared.config.ttl).then(|| entry.data.clone())
        })
    }

    /// Cached data for `path`, re-parsed first when absent or stale.
    /// Returns empty for destroyed caches, non-markdown paths, and files
    /// that no longer exist (removing any stale entry for those keys).
    pub async fn get(&self, path: &Path) -> Vec<T> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Vec::new();
        }
        if !is_markdown(path) {
            self.delete(path);
            return Vec::new();
        }
        // A deleted file invalidates its entry even while still fresh.
        if !self.store.file_exists(path) {
            self.delete(path);
            return Vec::new();
        }
        if let Some(data) = self.fresh_data(path) {
            return data;
        }

        let key_lock = {
            let mut inflight = self.shared.inflight.lock().expect("cache mutex poisoned");
            Arc::clone(
                inflight
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        let _guard = key_lock.lock().await;

        // Whoever held the lock before us may have refreshed already.
        if let Some(data) = self.fresh_data(path) {
            return data;
        }

        let Some(text) = self.store.read_file(path).await else {
            self.delete(path);
            return Vec::new();
        };
        let data = (self.parse)(&text);

        if self.shared.destroyed.load(Ordering::SeqCst) {
            // Refresh finished after destroy(): drop the result.
            return Vec::new();
        }
        trace!("refreshed cache entry for {}", path.display());
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(
                path.to_path_buf(),
                CachedEntry {
                    data: data.clone(),
                    last_updated: Instant::now(),
                },
            );
        data
    }

    /// Inserts data directly, stamping it as fresh now.
    pub fn set(&self, path: &Path, data: Vec<T>) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(
                path.to_path_buf(),
                CachedEntry {
                    data,
                    last_updated: Instant::now(),
                },
            );
    }

    pub fn delete(&self, path: &Path) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .remove(path);
    }

    pub fn clear(&self) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .clear();
    }

    /// Cached data for `path` as-is, without any freshness check or
    /// refresh. The rename pass uses this so vault scans stay bounded by
    /// what is already parsed.
    pub fn peek(&self, path: &Path) -> Option<Vec<T>> {
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .get(path)
            .map(|entry| entry.data.clone())
    }

    /// Every path with a live entry.
    pub fn keys(&self) -> Vec<PathBuf> {
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs one sweep pass immediately.
    pub fn sweep_now(&self) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.shared.sweep();
    }

    /// Stops the sweep task and clears all entries. Idempotent; every
    /// later operation on this cache is a no-op.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self
            .sweeper
            .lock()
            .expect("cache mutex poisoned")
            .take()
        {
            handle.abort();
        }
        self.shared
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .clear();
        debug!("document cache destroyed");
    }
}

impl<T, S> Drop for DocumentCache<T, S> {
    fn drop(&mut self) {
        self.shared.destroyed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.sweeper.lock().ok().and_then(|mut s| s.take()) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_vault_dir;
    use crate::store::FsStore;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    fn counting_parse(counter: Arc<AtomicUsize>) -> ParseFn<String> {
        Arc::new(move |text: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            text.lines().map(String::from).collect()
        })
    }

    fn config() -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            max_entries: 4,
        }
    }

    /// Test: get immediately after set returns the data unmodified.
    #[tokio::test]
    async fn test_get_after_set() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let cache = DocumentCache::new(store, config(), counting_parse(Arc::default()));

        let path = vault_dir.join("doc.md");
        fs::write(&path, "ignored on set path").unwrap();
        cache.set(&path, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.get(&path).await, vec!["a", "b"]);
    }

    /// Test: a fresh entry serves without re-parsing; an expired one
    /// triggers exactly one re-parse.
    #[tokio::test]
    async fn test_ttl_expiry_triggers_single_reparse() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let parses = Arc::new(AtomicUsize::new(0));
        let cache = DocumentCache::new(
            store,
            CacheConfig {
                ttl: Duration::from_millis(100),
                ..config()
            },
            counting_parse(Arc::clone(&parses)),
        );

        let path = vault_dir.join("doc.md");
        fs::write(&path, "line").unwrap();

        cache.get(&path).await;
        cache.get(&path).await;
        assert_eq!(parses.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        cache.get(&path).await;
        assert_eq!(parses.load(Ordering::SeqCst), 2);
    }

    /// Test: two callers racing on a stale key share one refresh.
    #[tokio::test]
    async fn test_concurrent_gets_deduplicate_refresh() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let parses = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(DocumentCache::new(
            store,
            config(),
            counting_parse(Arc::clone(&parses)),
        ));

        let path = vault_dir.join("doc.md");
        fs::write(&path, "line").unwrap();

        let (a, b) = tokio::join!(cache.get(&path), cache.get(&path));
        assert_eq!(a, b);
        assert_eq!(parses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_markdown_path_never_populates() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let cache = DocumentCache::new(store, config(), counting_parse(Arc::default()));

        let path = vault_dir.join("notes.txt");
        cache.set(&path, vec!["stale".to_string()]);
        assert!(cache.get(&path).await.is_empty());
        assert!(cache.is_empty());
    }

    /// Test: a stale entry for a file that no longer exists is removed on
    /// lookup instead of being served or refreshed.
    #[tokio::test]
    async fn test_missing_file_clears_entry() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let cache = DocumentCache::new(
            store,
            CacheConfig {
                ttl: Duration::from_secs(0),
                ..config()
            },
            counting_parse(Arc::default()),
        );

        let path = vault_dir.join("gone.md");
        cache.set(&path, vec!["stale".to_string()]);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get(&path).await.is_empty());
        assert!(cache.is_empty());
    }

    /// Test: a still-fresh entry for a file deleted out from under the
    /// cache is dropped on lookup instead of being served.
    #[tokio::test]
    async fn test_deleted_file_drops_fresh_entry() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let parses = Arc::new(AtomicUsize::new(0));
        let cache = DocumentCache::new(store, config(), counting_parse(Arc::clone(&parses)));

        let path = vault_dir.join("doc.md");
        fs::write(&path, "line").unwrap();
        assert_eq!(cache.get(&path).await, vec!["line"]);
        assert_eq!(cache.len(), 1);

        fs::remove_file(&path).unwrap();
        assert!(cache.get(&path).await.is_empty());
        assert!(cache.is_empty());
        assert_eq!(parses.load(Ordering::SeqCst), 1);
    }

    /// Test: over-capacity sweeps evict the oldest half by last write.
    #[tokio::test(start_paused = true)]
    async fn test_size_bound_evicts_oldest_half() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let cache = DocumentCache::new(store, config(), counting_parse(Arc::default()));

        for i in 0..6 {
            let path = vault_dir.join(format!("f{i}.md"));
            fs::write(&path, "body").unwrap();
            cache.set(&path, vec![format!("{i}")]);
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(cache.len(), 6);
        cache.sweep_now();
        assert_eq!(cache.len(), 3);

        // The newest entries survive.
        let survivors = cache.get(&vault_dir.join("f5.md")).await;
        assert_eq!(survivors, vec!["5"]);
    }

    /// Test: destroy is idempotent and later operations are no-ops.
    #[tokio::test]
    async fn test_destroy_idempotent_and_terminal() {
        let (_temp_dir, vault_dir) = create_test_vault_dir();
        let store = Arc::new(FsStore::new(&vault_dir));
        let cache = DocumentCache::new(store, config(), counting_parse(Arc::default()));

        let path = vault_dir.join("doc.md");
        fs::write(&path, "line").unwrap();
        cache.set(&path, vec!["x".to_string()]);

        cache.destroy();
        cache.destroy();

        assert!(cache.get(&path).await.is_empty());
        cache.set(&path, vec!["y".to_string()]);
        assert_eq!(cache.len(), 0);
    }
}
