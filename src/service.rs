//! Facade composing the index core.
//!
//! A `ContentIndexService` is constructed once by the composition root and
//! passed by reference to consumers. Its lifecycle is an explicit state
//! machine; operations outside `Ready` return a defined not-ready error
//! rather than undefined behavior.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{CacheManager, PathFilter};
use crate::config::Config;
use crate::embed::{EmbeddingBackend, EmbeddingStore, ProcessBackend, SemanticHit};
use crate::error::CoreError;
use crate::index::tagger::Tagger;
use crate::index::walker::Walker;
use crate::index::{IndexSymbol, SearchResult};
use crate::pool::WorkerPool;
use crate::query::{CompiledQuery, MatchMode};
use crate::watcher::{FileWatcher, WatcherHandle};

/// Lifecycle of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

impl ServiceState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Disposed => "disposed",
        }
    }
}

/// Outcome of `initialize`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InitReport {
    pub indexed: usize,
    pub failed: usize,
    pub embedded_chunks: usize,
}

/// Aggregated line search response: per-file failures are summarized,
/// not thrown.
#[derive(Debug, Default)]
pub struct DocumentMatches {
    pub results: Vec<SearchResult>,
    pub failed_files: usize,
}

#[derive(Clone)]
struct Core {
    pool: Arc<WorkerPool>,
    cache: Arc<CacheManager>,
    embeddings: Option<Arc<EmbeddingStore>>,
}

/// The public face of the content index.
pub struct ContentIndexService {
    root: PathBuf,
    config: Config,
    state: Mutex<ServiceState>,
    core: Mutex<Option<Core>>,
    /// Saved OR-mode pattern list for line filtering.
    line_filter: RwLock<Option<CompiledQuery>>,
    /// Backend override, mainly for tests and alternative backends.
    backend_override: Option<Arc<dyn EmbeddingBackend>>,
}

impl ContentIndexService {
    pub fn new(root: PathBuf, config: Config) -> Self {
        Self {
            root,
            config,
            state: Mutex::new(ServiceState::Uninitialized),
            core: Mutex::new(None),
            line_filter: RwLock::new(None),
            backend_override: None,
        }
    }

    /// Use the given embedding backend instead of spawning the configured
    /// process backend.
    pub fn with_embedding_backend(mut self, backend: Arc<dyn EmbeddingBackend>) -> Self {
        self.backend_override = Some(backend);
        self
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServiceState::Ready
    }

    /// Number of files currently indexed. Zero outside `Ready`.
    pub fn file_count(&self) -> usize {
        self.core()
            .map(|core| core.cache.file_count())
            .unwrap_or(0)
    }

    /// Enumerate, index, and (optionally) embed the source tree.
    ///
    /// Per-file failures are logged and counted. Fatal failures (no include
    /// path resolves, pool cannot start) surface here and leave the service
    /// uninitialized.
    pub async fn initialize(&self) -> Result<InitReport, CoreError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                ServiceState::Uninitialized => *state = ServiceState::Initializing,
                other => return Err(CoreError::NotReady(other.name())),
            }
        }

        match self.do_initialize().await {
            Ok(report) => {
                *self.state.lock().unwrap() = ServiceState::Ready;
                Ok(report)
            }
            Err(e) => {
                // A failed attempt may be retried from scratch
                *self.state.lock().unwrap() = ServiceState::Uninitialized;
                *self.core.lock().unwrap() = None;
                Err(e)
            }
        }
    }

    async fn do_initialize(&self) -> Result<InitReport, CoreError> {
        let walker = Walker::new(self.root.clone(), &self.config.indexer);
        if walker.resolved_include_paths().is_empty() {
            return Err(CoreError::Init(format!(
                "no include path under {} resolves",
                self.root.display()
            )));
        }

        let tagger = Tagger::new(self.config.indexer.tagger_path.clone());
        let pool = Arc::new(WorkerPool::new(
            self.config.indexer.workers.unwrap_or(0),
            tagger,
        )?);

        let cache = Arc::new(CacheManager::new(
            self.root.clone(),
            pool.clone(),
            PathFilter::from_config(&self.config.indexer),
        ));

        let files = walker.collect_files();
        info!(files = files.len(), workers = pool.worker_count(), "initializing index");
        let stats = cache.initialize(files.clone()).await;

        let mut embedded_chunks = 0;
        let embeddings = if self.config.embeddings.enabled {
            match self.build_embedding_store() {
                Some(store) => {
                    embedded_chunks = self.embed_files(&store, &files).await;
                    Some(store)
                }
                None => None,
            }
        } else {
            None
        };

        *self.core.lock().unwrap() = Some(Core {
            pool,
            cache,
            embeddings,
        });

        Ok(InitReport {
            indexed: stats.indexed,
            failed: stats.failed,
            embedded_chunks,
        })
    }

    fn build_embedding_store(&self) -> Option<Arc<EmbeddingStore>> {
        let backend: Arc<dyn EmbeddingBackend> = match &self.backend_override {
            Some(backend) => backend.clone(),
            None => match &self.config.embeddings.backend_path {
                Some(path) => Arc::new(ProcessBackend::new(path.clone())),
                None => {
                    warn!("embeddings enabled but no backend configured; semantic search disabled");
                    return None;
                }
            },
        };

        Some(Arc::new(EmbeddingStore::new(
            backend,
            self.config.embeddings.chunk_lines,
            self.config.embeddings.chunk_overlap,
            self.config.embeddings.batch_size,
        )))
    }

    async fn embed_files(&self, store: &Arc<EmbeddingStore>, files: &[PathBuf]) -> usize {
        if let Err(e) = store.backend().start().await {
            warn!("embedding backend failed to start: {}", e);
            return 0;
        }

        let mut total = 0;
        for path in files {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("skipping {} for embeddings: {}", path.display(), e);
                    continue;
                }
            };
            match store.index_file(path, &content).await {
                Ok(count) => total += count,
                Err(e) => warn!("embedding failed for {}: {}", path.display(), e),
            }
        }

        info!(chunks = total, "embedding build complete");
        total
    }

    fn core(&self) -> Result<Core, CoreError> {
        let state = self.state();
        if state != ServiceState::Ready {
            return Err(CoreError::NotReady(state.name()));
        }
        self.core
            .lock()
            .unwrap()
            .clone()
            .ok_or(CoreError::NotReady(state.name()))
    }

    /// AND-mode line search across the indexed tree.
    ///
    /// Every whitespace-separated glob term must match a line. Results come
    /// back in stable file order with 1-based line numbers; per-file
    /// failures are counted, never thrown. A cancelled call returns early
    /// with an empty result set.
    pub async fn document_matches(
        &self,
        query: &str,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
        cancel: Option<CancellationToken>,
    ) -> Result<DocumentMatches, CoreError> {
        let core = self.core()?;
        let compiled = CompiledQuery::compile(query, MatchMode::All)?;
        let cancel = cancel.unwrap_or_default();

        // Checkpoint: before dispatch
        if cancel.is_cancelled() {
            return Ok(DocumentMatches::default());
        }

        let paths = core.cache.all_paths(include, exclude);
        let inputs: Vec<(PathBuf, CompiledQuery)> = paths
            .into_iter()
            .map(|p| (p, compiled.clone()))
            .collect();

        // Checkpoint: across the fan-out; dispatched worker tasks finish on
        // their own, their output is simply discarded
        let outcomes = tokio::select! {
            outcomes = core.pool.search_all(inputs) => outcomes,
            _ = cancel.cancelled() => return Ok(DocumentMatches::default()),
        };

        // Checkpoint: after fan-in
        if cancel.is_cancelled() {
            return Ok(DocumentMatches::default());
        }

        let mut matches = DocumentMatches::default();
        for outcome in outcomes {
            match outcome.result {
                Ok(results) => matches.results.extend(results),
                Err(e) => {
                    matches.failed_files += 1;
                    warn!("search failed for {}: {}", outcome.path.display(), e);
                }
            }
        }

        Ok(matches)
    }

    /// Save an OR-mode pattern list for subsequent line filtering.
    pub fn set_line_filter(&self, patterns: &str) -> Result<(), CoreError> {
        let compiled = CompiledQuery::compile(patterns, MatchMode::Any)?;
        *self.line_filter.write().unwrap() = Some(compiled);
        Ok(())
    }

    /// Whether a line matches the saved OR-mode pattern list.
    /// With no saved list, nothing matches.
    pub fn line_matches_filter(&self, line: &str) -> bool {
        self.line_filter
            .read()
            .unwrap()
            .as_ref()
            .map(|q| q.matches(line))
            .unwrap_or(false)
    }

    /// Innermost symbol containing `line` (0-based) in `path`.
    ///
    /// The file is lazily (re)indexed if missing or stale.
    pub async fn container(
        &self,
        path: &Path,
        line: usize,
    ) -> Result<Option<IndexSymbol>, CoreError> {
        let results = self.containers(&[(path.to_path_buf(), line)]).await?;
        Ok(results.into_iter().next().flatten())
    }

    /// Batch container lookup, preserving input order.
    ///
    /// Lookups are grouped by file internally so each file is fetched from
    /// the cache once.
    pub async fn containers(
        &self,
        batch: &[(PathBuf, usize)],
    ) -> Result<Vec<Option<IndexSymbol>>, CoreError> {
        let core = self.core()?;

        let mut by_file: HashMap<PathBuf, Vec<usize>> = HashMap::new();
        for (slot, (path, _)) in batch.iter().enumerate() {
            by_file.entry(path.clone()).or_default().push(slot);
        }
        let unique_paths: Vec<PathBuf> = by_file.keys().cloned().collect();

        let indexes = core.cache.get(&unique_paths, true).await;

        let mut out: Vec<Option<IndexSymbol>> = vec![None; batch.len()];
        for (path, slots) in by_file {
            let Some(index) = indexes.get(&path) else {
                continue;
            };
            for slot in slots {
                let line = batch[slot].1;
                out[slot] = index.container_at(line).cloned();
            }
        }

        Ok(out)
    }

    /// Fully qualified name of the named symbol at `line` in `path`.
    pub async fn fully_qualified_name(
        &self,
        path: &Path,
        name: &str,
        line: usize,
    ) -> Result<Option<String>, CoreError> {
        let core = self.core()?;
        let indexes = core.cache.get(&[path.to_path_buf()], true).await;
        Ok(indexes
            .get(path)
            .and_then(|index| index.fully_qualified_name(name, line)))
    }

    /// Top-K semantic search. Empty when embeddings are disabled or the
    /// backend is not ready.
    pub async fn search_embeddings(
        &self,
        query: &str,
        top_k: usize,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<SemanticHit>, CoreError> {
        let core = self.core()?;
        let Some(store) = core.embeddings else {
            warn!("semantic search requested but embeddings are disabled");
            return Ok(Vec::new());
        };
        let cancel = cancel.unwrap_or_default();
        store.search(query, top_k, &cancel).await
    }

    /// Known indexed paths, optionally filtered by glob patterns.
    pub fn all_paths(
        &self,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> Result<Vec<PathBuf>, CoreError> {
        Ok(self.core()?.cache.all_paths(include, exclude))
    }

    /// Direct cache access for composition-level wiring (watcher, tools).
    pub fn cache(&self) -> Result<Arc<CacheManager>, CoreError> {
        Ok(self.core()?.cache)
    }

    /// Swap the active path filter without reindexing.
    pub fn update_filter(&self, filter: PathFilter) -> Result<(), CoreError> {
        self.core()?.cache.update_filter(filter);
        Ok(())
    }

    /// Spawn the file watcher wired to this service's cache and
    /// embedding store.
    pub fn spawn_watcher(&self) -> Result<WatcherHandle, CoreError> {
        let core = self.core()?;
        let watcher = FileWatcher::new(
            self.root.clone(),
            self.config.watcher.clone(),
            core.cache,
            core.embeddings,
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let stats = watcher.run(shutdown_rx).await.unwrap_or_else(|e| {
                warn!("watcher exited with error: {}", e);
                Default::default()
            });
            let _ = result_tx.send(stats);
        });

        Ok(WatcherHandle::new(shutdown_tx, result_rx))
    }

    /// Release the vector store and all cached indexes.
    pub async fn dispose(&self) {
        let core = {
            let mut state = self.state.lock().unwrap();
            *state = ServiceState::Disposed;
            self.core.lock().unwrap().take()
        };

        if let Some(core) = core {
            if let Some(store) = &core.embeddings {
                store.backend().stop().await;
                store.dispose();
            }
            core.cache.dispose();
            // Worker threads join when the pool's last Arc drops
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service(root: &Path) -> ContentIndexService {
        let mut config = Config::default();
        config.indexer.tagger_path = "true".to_string();
        ContentIndexService::new(root.to_path_buf(), config)
    }

    #[tokio::test]
    async fn test_operations_require_ready_state() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        assert!(!service.is_ready());
        assert_eq!(service.file_count(), 0);

        let err = service
            .document_matches("foo", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotReady(_)));

        let err = service.container(Path::new("x.rs"), 0).await.unwrap_err();
        assert!(matches!(err, CoreError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_initialize_fails_without_include_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.indexer.tagger_path = "true".to_string();
        config.indexer.include_paths = vec!["no-such-dir".to_string()];
        let service = ContentIndexService::new(dir.path().to_path_buf(), config);

        let err = service.initialize().await.unwrap_err();
        assert!(matches!(err, CoreError::Init(_)));
        assert!(!service.is_ready());
        assert_eq!(service.state(), ServiceState::Uninitialized);
    }

    #[tokio::test]
    async fn test_dispose_blocks_further_operations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();

        let service = test_service(dir.path());
        service.initialize().await.unwrap();
        assert!(service.is_ready());

        service.dispose().await;
        assert_eq!(service.state(), ServiceState::Disposed);
        assert!(!service.is_ready());

        let err = service.initialize().await.unwrap_err();
        assert!(matches!(err, CoreError::NotReady("disposed")));
    }

    #[tokio::test]
    async fn test_line_filter_uses_or_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        assert!(!service.line_matches_filter("anything"));

        service.set_line_filter("foo bar").unwrap();
        assert!(service.line_matches_filter("only foo here"));
        assert!(service.line_matches_filter("only bar here"));
        assert!(!service.line_matches_filter("neither"));
    }
}
