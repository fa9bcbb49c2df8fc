//! Embedding store: chunk vectors plus top-K similarity search.
//!
//! Sits on top of the cache's file content. If the backend is not ready,
//! queries degrade to empty results with a warning instead of failing the
//! caller.

pub mod backend;
pub mod chunker;
pub mod mock;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;

pub use backend::{EmbeddingBackend, ProcessBackend, DOCUMENT_PREFIX, QUERY_PREFIX};
pub use chunker::{Chunker, ChunkSpan};
pub use mock::MockBackend;

/// One embedded chunk of one file.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub path: PathBuf,
    /// 1-based inclusive chunk boundaries.
    pub start_line: usize,
    pub end_line: usize,
    pub vector: Vec<f32>,
}

/// A ranked semantic search hit.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub path: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
}

/// In-memory chunk-vector store backed by an external embedding backend.
pub struct EmbeddingStore {
    backend: Arc<dyn EmbeddingBackend>,
    chunker: Chunker,
    batch_size: usize,
    records: RwLock<HashMap<PathBuf, Vec<EmbeddingRecord>>>,
}

impl EmbeddingStore {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        chunk_lines: usize,
        chunk_overlap: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            backend,
            chunker: Chunker::new(chunk_lines, chunk_overlap),
            batch_size: batch_size.max(1),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    /// (Re)build the records for one file from its current content.
    ///
    /// Replaces any previously stored chunks for the path.
    pub async fn index_file(&self, path: &Path, content: &str) -> Result<usize, CoreError> {
        if !self.backend.is_ready().await {
            return Err(CoreError::EmbeddingUnavailable(format!(
                "{} backend not ready",
                self.backend.name()
            )));
        }

        let spans = self.chunker.chunk(content);
        if spans.is_empty() {
            self.records.write().unwrap().remove(path);
            return Ok(0);
        }

        let mut vectors = Vec::with_capacity(spans.len());
        let texts: Vec<String> = spans
            .iter()
            .map(|s| format!("{}{}", DOCUMENT_PREFIX, s.text))
            .collect();
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.backend.embed(batch).await?);
        }

        let records: Vec<EmbeddingRecord> = spans
            .into_iter()
            .zip(vectors)
            .map(|(span, vector)| EmbeddingRecord {
                path: path.to_path_buf(),
                start_line: span.start_line,
                end_line: span.end_line,
                vector,
            })
            .collect();

        let count = records.len();
        self.records
            .write()
            .unwrap()
            .insert(path.to_path_buf(), records);

        debug!(path = %path.display(), chunks = count, "embedded file");
        Ok(count)
    }

    /// Drop records for a deleted file.
    pub fn remove_file(&self, path: &Path) {
        self.records.write().unwrap().remove(path);
    }

    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().values().map(Vec::len).sum()
    }

    /// Top-K nearest-neighbor search over all stored vectors.
    ///
    /// Returns at most `top_k` hits sorted by descending score. A backend
    /// that is not ready yields an empty result and a warning, never an
    /// error.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SemanticHit>, CoreError> {
        if !self.backend.is_ready().await {
            warn!(
                "embedding backend '{}' not ready; returning no semantic results",
                self.backend.name()
            );
            return Ok(Vec::new());
        }

        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let prefixed = vec![format!("{}{}", QUERY_PREFIX, query)];
        let query_vector = match self.backend.embed(&prefixed).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => return Ok(Vec::new()),
            Err(CoreError::EmbeddingUnavailable(reason)) => {
                warn!("embedding backend unavailable mid-query: {}", reason);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let records = self.records.read().unwrap();
        let mut hits: Vec<SemanticHit> = records
            .values()
            .flatten()
            .map(|record| SemanticHit {
                path: record.path.clone(),
                start_line: record.start_line,
                end_line: record.end_line,
                score: cosine_similarity(&query_vector, &record.vector),
            })
            .collect();
        drop(records);

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        info!(query, hits = hits.len(), "semantic search completed");
        Ok(hits)
    }

    /// Release the vector store.
    pub fn dispose(&self) {
        self.records.write().unwrap().clear();
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
