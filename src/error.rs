//! Error taxonomy for the index core.
//!
//! Per-file indexing failures are isolated and summarized, never propagated
//! as batch failures. Only initialization-level problems surface as hard
//! errors to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the index core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The query was empty or malformed. Rejected before any dispatch.
    #[error("invalid query: {0}")]
    Validation(String),

    /// The tagging subprocess (or file read) failed for a single file.
    #[error("failed to index {path}: {reason}")]
    Index { path: PathBuf, reason: String },

    /// A filesystem event could not be delivered or handled.
    /// The watcher logs these and keeps running.
    #[error("watcher error: {0}")]
    Watcher(String),

    /// The embedding backend is not started or not ready. Callers degrade
    /// to empty results instead of failing.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A worker crashed or its channel closed mid-task.
    #[error("worker pool dispatch failed: {0}")]
    PoolDispatch(String),

    /// Operation called outside the Ready state.
    #[error("service is not ready (state: {0})")]
    NotReady(&'static str),

    /// Initialization could not complete (no include path resolved,
    /// pool could not start).
    #[error("initialization failed: {0}")]
    Init(String),
}

impl CoreError {
    pub fn index(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Index {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_display() {
        let err = CoreError::index("/tmp/a.rs", "ctags exited with status 1");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/a.rs"));
        assert!(msg.contains("ctags"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = CoreError::Validation("empty query".to_string());
        assert_eq!(err.to_string(), "invalid query: empty query");
    }
}
