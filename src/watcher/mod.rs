//! File system watcher driving cache invalidation and re-indexing.
//!
//! Change notifications are debounced, filtered through the cache's active
//! path filter, and coalesced per path before being applied. A startup
//! grace period swallows the burst of touch-ups editors perform right
//! after a workspace loads.

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebouncedEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::cache::CacheManager;
use crate::config::WatcherConfig;
use crate::embed::EmbeddingStore;
use crate::error::CoreError;

/// Types of file system changes the watcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Created => write!(f, "created"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Deleted => write!(f, "deleted"),
        }
    }
}

/// A coalesced file change.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub change_type: ChangeType,
}

/// Statistics accumulated over the watcher's lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WatchStats {
    pub reindexed: usize,
    pub removed: usize,
    pub errors: usize,
}

impl WatchStats {
    pub fn merge(&mut self, other: &WatchStats) {
        self.reindexed += other.reindexed;
        self.removed += other.removed;
        self.errors += other.errors;
    }
}

/// Watches the project root and feeds invalidation into the cache and,
/// when semantic search is enabled, the embedding store.
pub struct FileWatcher {
    root: PathBuf,
    config: WatcherConfig,
    cache: Arc<CacheManager>,
    embeddings: Option<Arc<EmbeddingStore>>,
}

impl FileWatcher {
    pub fn new(
        root: PathBuf,
        config: WatcherConfig,
        cache: Arc<CacheManager>,
        embeddings: Option<Arc<EmbeddingStore>>,
    ) -> Self {
        Self {
            root,
            config,
            cache,
            embeddings,
        }
    }

    /// Run until the shutdown signal fires. Returns total statistics.
    pub async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<WatchStats> {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let grace = Duration::from_millis(self.config.startup_grace_ms);
        let started = Instant::now();

        let (tx, mut rx) = mpsc::channel::<Vec<DebouncedEvent>>(100);

        let tx_clone = tx.clone();
        let mut debouncer = new_debouncer(
            debounce,
            None,
            move |result: std::result::Result<Vec<DebouncedEvent>, Vec<notify::Error>>| {
                match result {
                    Ok(events) => {
                        if !events.is_empty() {
                            if let Err(e) = tx_clone.blocking_send(events) {
                                error!("Failed to send debounced events: {}", e);
                            }
                        }
                    }
                    Err(errors) => {
                        // Delivery failures are logged; the watcher keeps running
                        for error in errors {
                            error!("Watch error: {}", error);
                        }
                    }
                }
            },
        )
        .map_err(|e| CoreError::Watcher(format!("failed to create debouncer: {}", e)))?;

        debouncer
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| {
                CoreError::Watcher(format!("failed to watch {:?}: {}", self.root, e))
            })?;

        info!("Watching directory: {:?}", self.root);
        info!(
            "Debounce: {}ms, startup grace: {}ms",
            self.config.debounce_ms, self.config.startup_grace_ms
        );

        let mut total = WatchStats::default();

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received, stopping watcher");
                    break;
                }

                Some(events) = rx.recv() => {
                    if started.elapsed() < grace {
                        debug!("Dropping {} events inside startup grace period", events.len());
                        continue;
                    }

                    let changes = self.convert_events(events);
                    if !changes.is_empty() {
                        info!("Processing {} file changes", changes.len());
                        let stats = self.apply_changes(changes).await;
                        total.merge(&stats);
                    }
                }
            }
        }

        Ok(total)
    }

    /// Convert notify events into coalesced per-path changes.
    fn convert_events(&self, events: Vec<DebouncedEvent>) -> Vec<FileChange> {
        let mut changes = Vec::new();

        for event in &events {
            for path in &event.paths {
                if path.is_dir() {
                    continue;
                }

                let change_type = match event.kind {
                    notify::EventKind::Create(_) => ChangeType::Created,
                    notify::EventKind::Modify(_) => ChangeType::Modified,
                    notify::EventKind::Remove(_) => ChangeType::Deleted,
                    _ => continue,
                };

                // Deletions of known files must go through even if the
                // extension check can no longer stat the path
                if change_type != ChangeType::Deleted && !self.cache.filter_matches(path) {
                    debug!("Skipping filtered path: {:?}", path);
                    continue;
                }

                debug!("File change detected: {:?} -> {:?}", change_type, path);
                changes.push(FileChange {
                    path: path.clone(),
                    change_type,
                });
            }
        }

        // Coalesce bursts: keep the last change type per path
        let mut seen: HashMap<PathBuf, FileChange> = HashMap::new();
        for change in changes {
            seen.insert(change.path.clone(), change);
        }

        seen.into_values().collect()
    }

    /// Apply a batch of changes to the cache and the embedding store.
    async fn apply_changes(&self, changes: Vec<FileChange>) -> WatchStats {
        let mut stats = WatchStats::default();

        for change in changes {
            match change.change_type {
                ChangeType::Created | ChangeType::Modified => {
                    self.cache.invalidate(&change.path);
                    let rebuilt = self.cache.get(&[change.path.clone()], true).await;
                    if rebuilt.contains_key(&change.path) {
                        stats.reindexed += 1;
                        info!("Re-indexed {} file: {:?}", change.change_type, change.path);
                    } else {
                        stats.errors += 1;
                        warn!("Failed to re-index: {:?}", change.path);
                    }

                    if let Some(store) = &self.embeddings {
                        match std::fs::read_to_string(&change.path) {
                            Ok(content) => {
                                if let Err(e) = store.index_file(&change.path, &content).await {
                                    warn!("Failed to re-embed {:?}: {}", change.path, e);
                                }
                            }
                            Err(e) => warn!("Skipping re-embed of {:?}: {}", change.path, e),
                        }
                    }
                }
                ChangeType::Deleted => {
                    self.cache.remove(&change.path);
                    if let Some(store) = &self.embeddings {
                        store.remove_file(&change.path);
                    }
                    stats.removed += 1;
                    info!("Removed deleted file from index: {:?}", change.path);
                }
            }
        }

        stats
    }
}

/// Handle to control a running watcher.
pub struct WatcherHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    result_rx: Option<oneshot::Receiver<WatchStats>>,
}

impl WatcherHandle {
    pub fn new(
        shutdown_tx: oneshot::Sender<()>,
        result_rx: oneshot::Receiver<WatchStats>,
    ) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            result_rx: Some(result_rx),
        }
    }

    /// Request graceful shutdown.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the watcher to finish and get the final stats.
    pub async fn wait(mut self) -> Result<WatchStats> {
        if let Some(rx) = self.result_rx.take() {
            rx.await.with_context(|| "Watcher task panicked")
        } else {
            Ok(WatchStats::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PathFilter;
    use crate::config::IndexerConfig;
    use crate::embed::MockBackend;
    use crate::index::tagger::Tagger;
    use crate::pool::WorkerPool;
    use tempfile::{tempdir, TempDir};
    use tokio_util::sync::CancellationToken;

    fn cache_for(dir: &TempDir) -> Arc<CacheManager> {
        let pool = Arc::new(WorkerPool::new(1, Tagger::new("true")).unwrap());
        let filter = PathFilter::from_config(&IndexerConfig::default());
        Arc::new(CacheManager::new(dir.path().to_path_buf(), pool, filter))
    }

    #[tokio::test]
    async fn test_apply_changes_maintains_embeddings() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn parse_config() {}\n").unwrap();

        let cache = cache_for(&dir);
        let store = Arc::new(EmbeddingStore::new(
            Arc::new(MockBackend::started(32)),
            40,
            10,
            32,
        ));
        let watcher = FileWatcher::new(
            dir.path().to_path_buf(),
            WatcherConfig::default(),
            cache.clone(),
            Some(store.clone()),
        );

        let stats = watcher
            .apply_changes(vec![FileChange {
                path: file.clone(),
                change_type: ChangeType::Created,
            }])
            .await;
        assert_eq!(stats.reindexed, 1);
        assert_eq!(store.record_count(), 1);

        // A delete purges both the symbol cache and the vector store
        std::fs::remove_file(&file).unwrap();
        let stats = watcher
            .apply_changes(vec![FileChange {
                path: file.clone(),
                change_type: ChangeType::Deleted,
            }])
            .await;
        assert_eq!(stats.removed, 1);
        assert_eq!(cache.file_count(), 0);
        assert_eq!(store.record_count(), 0);

        let cancel = CancellationToken::new();
        let hits = store.search("parse config", 10, &cancel).await.unwrap();
        assert!(hits.iter().all(|h| h.path != file));
    }

    #[tokio::test]
    async fn test_apply_changes_without_embeddings() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn main() {}\n").unwrap();

        let cache = cache_for(&dir);
        let watcher = FileWatcher::new(
            dir.path().to_path_buf(),
            WatcherConfig::default(),
            cache.clone(),
            None,
        );

        let stats = watcher
            .apply_changes(vec![FileChange {
                path: file,
                change_type: ChangeType::Modified,
            }])
            .await;
        assert_eq!(stats.reindexed, 1);
        assert_eq!(cache.file_count(), 1);
    }

    #[tokio::test]
    async fn test_watch_missing_root_is_watcher_error() {
        let dir = tempdir().unwrap();
        let cache = cache_for(&dir);
        let watcher = FileWatcher::new(
            PathBuf::from("/nonexistent/watch-root"),
            WatcherConfig::default(),
            cache,
            None,
        );

        let (_tx, rx) = oneshot::channel();
        let err = watcher.run(rx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::Watcher(_))
        ));
    }

    #[test]
    fn test_change_type_display() {
        assert_eq!(format!("{}", ChangeType::Created), "created");
        assert_eq!(format!("{}", ChangeType::Modified), "modified");
        assert_eq!(format!("{}", ChangeType::Deleted), "deleted");
    }

    #[test]
    fn test_watch_stats_merge() {
        let mut a = WatchStats {
            reindexed: 2,
            removed: 1,
            errors: 0,
        };
        let b = WatchStats {
            reindexed: 1,
            removed: 0,
            errors: 3,
        };
        a.merge(&b);
        assert_eq!(a.reindexed, 3);
        assert_eq!(a.removed, 1);
        assert_eq!(a.errors, 3);
    }
}
