//! Fixed-size worker pool for per-file indexing and searching.
//!
//! Workers are OS threads that share no mutable state with the
//! orchestrator; a task envelope goes in over the worker's inbox and the
//! result comes back over a oneshot channel embedded in the envelope.
//! Dispatch is round-robin. One file failing (tool crash, unreadable
//! content) is reported in that task's result and never aborts a batch.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::index::tagger::Tagger;
use crate::index::{FileIndex, SearchResult};
use crate::query::CompiledQuery;

/// Task envelope sent to a worker.
enum Task {
    Index {
        path: PathBuf,
        reply: oneshot::Sender<Result<FileIndex, CoreError>>,
    },
    Search {
        path: PathBuf,
        query: CompiledQuery,
        reply: oneshot::Sender<SearchOutcome>,
    },
}

/// Per-file search result envelope, correlated with its input by path.
#[derive(Debug)]
pub struct SearchOutcome {
    pub path: PathBuf,
    pub result: Result<Vec<SearchResult>, CoreError>,
}

/// Fixed set of worker threads with message-passing dispatch.
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<Task>>,
    handles: Vec<JoinHandle<()>>,
    next: AtomicUsize,
}

impl WorkerPool {
    /// Start `workers` threads (0 means detected CPU count).
    pub fn new(workers: usize, tagger: Tagger) -> Result<Self, CoreError> {
        let count = if workers == 0 {
            num_cpus::get().max(1)
        } else {
            workers
        };

        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let (tx, rx) = mpsc::channel::<Task>();
            let worker_tagger = tagger.clone();

            let handle = std::thread::Builder::new()
                .name(format!("symdex-worker-{}", id))
                .spawn(move || worker_loop(id, rx, worker_tagger))
                .map_err(|e| CoreError::PoolDispatch(format!("failed to spawn worker: {}", e)))?;

            senders.push(tx);
            handles.push(handle);
        }

        debug!(workers = count, "worker pool started");

        Ok(Self {
            senders,
            handles,
            next: AtomicUsize::new(0),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    fn dispatch(&self, task: Task) -> Result<(), CoreError> {
        if self.senders.is_empty() {
            return Err(CoreError::PoolDispatch("pool is disposed".to_string()));
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.senders[idx]
            .send(task)
            .map_err(|_| CoreError::PoolDispatch("worker inbox closed".to_string()))
    }

    /// Index one file on a worker and await the result.
    pub async fn index_file(&self, path: PathBuf) -> Result<FileIndex, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(Task::Index { path, reply: tx })?;
        rx.await
            .map_err(|_| CoreError::PoolDispatch("worker dropped reply".to_string()))?
    }

    /// Fan a search out across the pool and fan results back in.
    ///
    /// The output vector correlates 1:1 with `inputs` by position, even
    /// when individual files fail.
    pub async fn search_all(&self, inputs: Vec<(PathBuf, CompiledQuery)>) -> Vec<SearchOutcome> {
        let mut receivers = Vec::with_capacity(inputs.len());

        for (path, query) in inputs {
            let (tx, rx) = oneshot::channel();
            match self.dispatch(Task::Search {
                path: path.clone(),
                query,
                reply: tx,
            }) {
                Ok(()) => receivers.push((path, Some(rx))),
                Err(e) => {
                    // Report the dispatch failure in-slot, keep the batch going
                    receivers.push((path, None));
                    warn!("search dispatch failed: {}", e);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(receivers.len());
        for (path, rx) in receivers {
            let outcome = match rx {
                Some(rx) => match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => SearchOutcome {
                        path: path.clone(),
                        result: Err(CoreError::PoolDispatch(
                            "worker dropped reply".to_string(),
                        )),
                    },
                },
                None => SearchOutcome {
                    path: path.clone(),
                    result: Err(CoreError::PoolDispatch("worker inbox closed".to_string())),
                },
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Drain outstanding work and stop all workers.
    pub fn dispose(&mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn worker_loop(id: usize, rx: mpsc::Receiver<Task>, tagger: Tagger) {
    while let Ok(task) = rx.recv() {
        match task {
            Task::Index { path, reply } => {
                let result = catch_unwind(AssertUnwindSafe(|| tagger.index_file(&path)))
                    .unwrap_or_else(|_| {
                        Err(CoreError::index(&path, "panic while indexing"))
                    });
                // Caller may have gone away; that is fine
                let _ = reply.send(result);
            }
            Task::Search { path, query, reply } => {
                let result = catch_unwind(AssertUnwindSafe(|| search_file(&path, &query)))
                    .unwrap_or_else(|_| {
                        Err(CoreError::index(&path, "panic while searching"))
                    });
                let _ = reply.send(SearchOutcome { path, result });
            }
        }
    }
    debug!(worker = id, "worker stopped");
}

/// Scan one file line by line against a compiled query.
fn search_file(path: &PathBuf, query: &CompiledQuery) -> Result<Vec<SearchResult>, CoreError> {
    let content = fs::read_to_string(path)
        .map_err(|e| CoreError::index(path, format!("read failed: {}", e)))?;

    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| query.matches(line))
        .map(|(i, line)| SearchResult {
            path: path.clone(),
            line: i + 1,
            text: line.trim().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MatchMode;
    use std::fs;
    use tempfile::tempdir;

    fn pool() -> WorkerPool {
        // "true" exits 0 with no output: every file indexes to zero symbols
        WorkerPool::new(2, Tagger::new("true")).unwrap()
    }

    #[tokio::test]
    async fn test_search_all_correlates_one_to_one() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let missing = dir.path().join("missing.txt");
        fs::write(&a, "foo here\nnothing\nfoo again\n").unwrap();
        fs::write(&b, "bar only\n").unwrap();

        let pool = pool();
        let query = CompiledQuery::compile("foo", MatchMode::All).unwrap();
        let inputs = vec![
            (a.clone(), query.clone()),
            (missing.clone(), query.clone()),
            (b.clone(), query.clone()),
        ];

        let outcomes = pool.search_all(inputs).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].path, a);
        assert_eq!(outcomes[0].result.as_ref().unwrap().len(), 2);
        assert_eq!(outcomes[0].result.as_ref().unwrap()[0].line, 1);
        assert_eq!(outcomes[0].result.as_ref().unwrap()[1].line, 3);

        // The unreadable file errors in its own slot
        assert_eq!(outcomes[1].path, missing);
        assert!(outcomes[1].result.is_err());

        assert_eq!(outcomes[2].path, b);
        assert!(outcomes[2].result.as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_result_text_is_trimmed() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("x.txt");
        fs::write(&file, "    indented foo    \n").unwrap();

        let pool = pool();
        let query = CompiledQuery::compile("foo", MatchMode::All).unwrap();
        let outcomes = pool.search_all(vec![(file, query)]).await;

        let results = outcomes[0].result.as_ref().unwrap();
        assert_eq!(results[0].text, "indented foo");
    }

    #[tokio::test]
    async fn test_index_file_error_is_isolated() {
        let pool = pool();
        let err = pool
            .index_file(PathBuf::from("/nonexistent/z.rs"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Index { .. }));

        // Pool still serves subsequent tasks
        let dir = tempdir().unwrap();
        let file = dir.path().join("ok.rs");
        fs::write(&file, "fn main() {}\n").unwrap();
        let index = pool.index_file(file.clone()).await.unwrap();
        assert_eq!(index.path, file);
    }

    #[tokio::test]
    async fn test_worker_count_detection() {
        let pool = WorkerPool::new(0, Tagger::new("true")).unwrap();
        assert!(pool.worker_count() >= 1);

        let pool = WorkerPool::new(3, Tagger::new("true")).unwrap();
        assert_eq!(pool.worker_count(), 3);
    }

    #[tokio::test]
    async fn test_dispose_joins_workers() {
        let mut pool = pool();
        pool.dispose();
        // Dispatch after dispose fails cleanly instead of hanging
        let err = pool.index_file(PathBuf::from("/tmp/x")).await;
        assert!(err.is_err());
    }
}
