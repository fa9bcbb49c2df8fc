//! Cache manager: owns the path -> FileIndex map and drives (re)indexing
//! through the worker pool.
//!
//! The map is mutated only by the orchestrating layer; readers receive
//! `Arc<FileIndex>` snapshots so a re-index never exposes a half-built
//! index. Concurrent demands for the same path are deduplicated through an
//! in-flight marker so exactly one index operation runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::config::IndexerConfig;
use crate::error::CoreError;
use crate::index::tagger;
use crate::index::FileIndex;
use crate::pool::WorkerPool;

/// Active include/exclude/extension filter for watched paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: HashSet<String>,
    ignore_patterns: Vec<String>,
}

impl PathFilter {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            extensions: config.extensions.iter().cloned().collect(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Whether a path is inside the active filter.
    pub fn matches(&self, path: &Path) -> bool {
        let by_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(e))
            .unwrap_or(false);
        if !by_extension {
            return false;
        }

        let path_str = path.to_string_lossy();
        !self
            .ignore_patterns
            .iter()
            .any(|p| path_str.contains(p.as_str()))
    }
}

/// Result of the initial bulk scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct InitStats {
    pub indexed: usize,
    pub failed: usize,
}

struct CacheEntry {
    index: Arc<FileIndex>,
    stale: bool,
}

/// Owns index lifetime and invalidation.
pub struct CacheManager {
    root: PathBuf,
    pool: Arc<WorkerPool>,
    entries: StdMutex<HashMap<PathBuf, CacheEntry>>,
    /// In-flight markers for request deduplication. Late arrivals clone the
    /// receiver and await the single outstanding operation.
    inflight: AsyncMutex<HashMap<PathBuf, watch::Receiver<bool>>>,
    filter: StdMutex<PathFilter>,
    index_dispatches: AtomicUsize,
    failed_files: AtomicUsize,
}

impl CacheManager {
    pub fn new(root: PathBuf, pool: Arc<WorkerPool>, filter: PathFilter) -> Self {
        Self {
            root,
            pool,
            entries: StdMutex::new(HashMap::new()),
            inflight: AsyncMutex::new(HashMap::new()),
            filter: StdMutex::new(filter),
            index_dispatches: AtomicUsize::new(0),
            failed_files: AtomicUsize::new(0),
        }
    }

    /// Bulk-index the given files through the pool.
    ///
    /// Individual failures are logged and counted, never fatal.
    pub async fn initialize(&self, files: Vec<PathBuf>) -> InitStats {
        let total = files.len();
        info!(files = total, "starting bulk index");

        let results =
            futures::future::join_all(files.iter().map(|path| self.ensure_indexed(path))).await;

        let indexed = results.iter().filter(|r| r.is_some()).count();
        let failed = total - indexed;

        info!(indexed, failed, "bulk index complete");
        InitStats { indexed, failed }
    }

    /// Look up indexes for the given paths.
    ///
    /// With `ensure_valid`, any path that is missing, marked stale, or
    /// whose on-disk fingerprint is newer than the cached one is re-indexed
    /// before returning; without it, only whatever is already cached comes
    /// back.
    pub async fn get(
        &self,
        paths: &[PathBuf],
        ensure_valid: bool,
    ) -> HashMap<PathBuf, Arc<FileIndex>> {
        let mut out = HashMap::new();

        for path in paths {
            let cached = {
                let entries = self.entries.lock().unwrap();
                entries.get(path).map(|e| (e.index.clone(), e.stale))
            };

            match cached {
                Some((index, stale)) => {
                    let fresh = !stale && tagger::is_fresh(path, &index);
                    if fresh || !ensure_valid {
                        out.insert(path.clone(), index);
                    } else if let Some(rebuilt) = self.ensure_indexed(path).await {
                        out.insert(path.clone(), rebuilt);
                    } else {
                        // Re-index failed; a stale snapshot beats nothing
                        out.insert(path.clone(), index);
                    }
                }
                None if ensure_valid => {
                    if let Some(index) = self.ensure_indexed(path).await {
                        out.insert(path.clone(), index);
                    }
                }
                None => {}
            }
        }

        out
    }

    /// Index one path, deduplicating concurrent requests.
    async fn ensure_indexed(&self, path: &PathBuf) -> Option<Arc<FileIndex>> {
        loop {
            // Another caller may have just finished
            {
                let entries = self.entries.lock().unwrap();
                if let Some(e) = entries.get(path) {
                    if !e.stale && tagger::is_fresh(path, &e.index) {
                        return Some(e.index.clone());
                    }
                }
            }

            let tx = {
                let mut inflight = self.inflight.lock().await;
                match inflight.get(path) {
                    Some(rx) => {
                        let mut rx = rx.clone();
                        drop(inflight);
                        // Await the outstanding operation, then re-check
                        let _ = rx.changed().await;
                        continue;
                    }
                    None => {
                        let (tx, rx) = watch::channel(false);
                        inflight.insert(path.clone(), rx);
                        tx
                    }
                }
            };

            // This caller owns the single index operation for the path
            self.index_dispatches.fetch_add(1, Ordering::Relaxed);
            let result = self.pool.index_file(path.clone()).await;

            let produced = {
                let mut entries = self.entries.lock().unwrap();
                match result {
                    Ok(index) => {
                        let index = Arc::new(index);
                        entries.insert(
                            path.clone(),
                            CacheEntry {
                                index: index.clone(),
                                stale: false,
                            },
                        );
                        Some(index)
                    }
                    Err(e) => {
                        self.failed_files.fetch_add(1, Ordering::Relaxed);
                        warn!("indexing failed: {}", e);
                        None
                    }
                }
            };

            self.inflight.lock().await.remove(path);
            let _ = tx.send(true);

            return produced;
        }
    }

    /// Mark an entry stale so the next validated lookup rebuilds it.
    pub fn invalidate(&self, path: &Path) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(path) {
            entry.stale = true;
            debug!(path = %path.display(), "cache entry invalidated");
        }
    }

    /// Drop an entry outright (file deleted or filtered out).
    pub fn remove(&self, path: &Path) {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(path).is_some() {
            debug!(path = %path.display(), "cache entry removed");
        }
    }

    /// Known paths filtered through optional include/exclude glob patterns.
    pub fn all_paths(&self, include: Option<&[String]>, exclude: Option<&[String]>) -> Vec<PathBuf> {
        let include = compile_patterns(include);
        let exclude = compile_patterns(exclude);

        let entries = self.entries.lock().unwrap();
        let mut paths: Vec<PathBuf> = entries
            .keys()
            .filter(|path| {
                let rel = self.relative_str(path);
                let included = include.is_empty() || include.iter().any(|p| p.matches(&rel));
                let excluded = exclude.iter().any(|p| p.matches(&rel));
                included && !excluded
            })
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    pub fn file_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_files.load(Ordering::Relaxed)
    }

    /// Number of index operations actually dispatched to the pool.
    pub fn index_dispatches(&self) -> usize {
        self.index_dispatches.load(Ordering::Relaxed)
    }

    /// Swap the active filter without forcing a reindex.
    pub fn update_filter(&self, filter: PathFilter) {
        *self.filter.lock().unwrap() = filter;
    }

    /// Whether a path falls inside the active filter (used by the watcher).
    pub fn filter_matches(&self, path: &Path) -> bool {
        self.filter.lock().unwrap().matches(path)
    }

    /// Clear all cached state.
    pub fn dispose(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn relative_str(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

fn compile_patterns(patterns: Option<&[String]>) -> Vec<glob::Pattern> {
    patterns
        .unwrap_or(&[])
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("ignoring invalid glob pattern '{}': {}", p, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::index::tagger::Tagger;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn manager(dir: &TempDir) -> CacheManager {
        let pool = Arc::new(WorkerPool::new(2, Tagger::new("true")).unwrap());
        let filter = PathFilter::from_config(&IndexerConfig::default());
        CacheManager::new(dir.path().to_path_buf(), pool, filter)
    }

    #[tokio::test]
    async fn test_concurrent_get_deduplicates() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}\n").unwrap();

        let manager = manager(&dir);
        let paths = vec![file.clone()];

        let (a, b) = tokio::join!(manager.get(&paths, true), manager.get(&paths, true));

        assert!(a.contains_key(&file));
        assert!(b.contains_key(&file));
        assert_eq!(manager.index_dispatches(), 1);
    }

    #[tokio::test]
    async fn test_get_without_ensure_valid_skips_missing() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}\n").unwrap();

        let manager = manager(&dir);
        let result = manager.get(&[file.clone()], false).await;

        assert!(result.is_empty());
        assert_eq!(manager.index_dispatches(), 0);
    }

    #[tokio::test]
    async fn test_remove_drops_entry() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}\n").unwrap();

        let manager = manager(&dir);
        manager.get(&[file.clone()], true).await;
        assert_eq!(manager.file_count(), 1);

        manager.remove(&file);
        assert_eq!(manager.file_count(), 0);
        assert!(manager.all_paths(None, None).is_empty());

        fs::remove_file(&file).unwrap();
        let result = manager.get(&[file], true).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_all_paths_glob_filtering() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let a = src.join("main.rs");
        let b = dir.path().join("script.py");
        fs::write(&a, "fn main() {}\n").unwrap();
        fs::write(&b, "print('x')\n").unwrap();

        let manager = manager(&dir);
        manager.get(&[a.clone(), b.clone()], true).await;

        let all = manager.all_paths(None, None);
        assert_eq!(all.len(), 2);

        let rust_only = manager.all_paths(Some(&["*.rs".to_string()]), None);
        assert_eq!(rust_only, vec![a.clone()]);

        let no_python = manager.all_paths(None, Some(&["*.py".to_string()]));
        assert_eq!(no_python, vec![a]);
    }

    #[tokio::test]
    async fn test_initialize_isolates_failures() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.rs");
        fs::write(&good, "fn main() {}\n").unwrap();
        let missing = dir.path().join("missing.rs");

        let manager = manager(&dir);
        let stats = manager.initialize(vec![good.clone(), missing]).await;

        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(manager.file_count(), 1);
    }

    #[tokio::test]
    async fn test_update_filter_swaps_without_reindex() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}\n").unwrap();

        let manager = manager(&dir);
        manager.get(&[file.clone()], true).await;
        let dispatched = manager.index_dispatches();
        assert!(manager.filter_matches(&file));

        let mut config = IndexerConfig::default();
        config.extensions = vec!["py".to_string()];
        manager.update_filter(PathFilter::from_config(&config));

        // The new filter governs subsequent event decisions
        assert!(!manager.filter_matches(&file));
        assert!(manager.filter_matches(Path::new("/work/script.py")));

        // Existing entries survive and nothing was re-dispatched
        assert_eq!(manager.file_count(), 1);
        assert_eq!(manager.index_dispatches(), dispatched);
    }

    #[test]
    fn test_path_filter() {
        let filter = PathFilter::from_config(&IndexerConfig::default());

        assert!(filter.matches(Path::new("/work/src/main.rs")));
        assert!(!filter.matches(Path::new("/work/notes.txt")));
        assert!(!filter.matches(Path::new("/work/target/debug/main.rs")));
        assert!(!filter.matches(Path::new("/work/Makefile")));
    }
}
