//! Embedding backend seam.
//!
//! Backends have an explicit lifecycle (start, stop, readiness) and follow
//! an asymmetric-embedding convention: documents and queries get different
//! textual prefixes before embedding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CoreError;

/// Prefix applied to document chunks before embedding.
pub const DOCUMENT_PREFIX: &str = "search_document: ";

/// Prefix applied to queries before embedding.
pub const QUERY_PREFIX: &str = "search_query: ";

/// External embedding backend with an explicit lifecycle.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Start the backend. Idempotent.
    async fn start(&self) -> Result<(), CoreError>;

    /// Stop the backend and release its resources.
    async fn stop(&self);

    /// Whether the backend can serve embed calls right now.
    async fn is_ready(&self) -> bool;

    /// Embed a batch of already-prefixed texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

struct BackendProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Backend speaking JSON lines over a child process's stdio.
///
/// Protocol: one `{"texts": [...]}` request line in, one
/// `{"vectors": [[...], ...]}` response line out.
pub struct ProcessBackend {
    command: String,
    process: Mutex<Option<BackendProcess>>,
}

impl ProcessBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            process: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for ProcessBackend {
    async fn start(&self) -> Result<(), CoreError> {
        let mut guard = self.process.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CoreError::EmbeddingUnavailable(format!(
                    "failed to start '{}': {}",
                    self.command, e
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            CoreError::EmbeddingUnavailable("backend stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            CoreError::EmbeddingUnavailable("backend stdout unavailable".to_string())
        })?;

        info!("embedding backend started: {}", self.command);
        *guard = Some(BackendProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        Ok(())
    }

    async fn stop(&self) {
        let mut guard = self.process.lock().await;
        if let Some(mut process) = guard.take() {
            let _ = process.child.start_kill();
            debug!("embedding backend stopped");
        }
    }

    async fn is_ready(&self) -> bool {
        self.process.lock().await.is_some()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut guard = self.process.lock().await;
        let process = guard.as_mut().ok_or_else(|| {
            CoreError::EmbeddingUnavailable("backend not started".to_string())
        })?;

        let mut request = serde_json::to_string(&EmbedRequest { texts })
            .map_err(|e| CoreError::EmbeddingUnavailable(format!("encode failed: {}", e)))?;
        request.push('\n');

        process
            .stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|e| CoreError::EmbeddingUnavailable(format!("write failed: {}", e)))?;
        process
            .stdin
            .flush()
            .await
            .map_err(|e| CoreError::EmbeddingUnavailable(format!("flush failed: {}", e)))?;

        let mut line = String::new();
        let read = process
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| CoreError::EmbeddingUnavailable(format!("read failed: {}", e)))?;
        if read == 0 {
            return Err(CoreError::EmbeddingUnavailable(
                "backend closed its stdout".to_string(),
            ));
        }

        let response: EmbedResponse = serde_json::from_str(&line)
            .map_err(|e| CoreError::EmbeddingUnavailable(format!("decode failed: {}", e)))?;

        if response.vectors.len() != texts.len() {
            return Err(CoreError::EmbeddingUnavailable(format!(
                "backend returned {} vectors for {} texts",
                response.vectors.len(),
                texts.len()
            )));
        }

        Ok(response.vectors)
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unstarted_backend_is_not_ready() {
        let backend = ProcessBackend::new("/does/not/exist");
        assert!(!backend.is_ready().await);

        let err = backend.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, CoreError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_start_failure_is_embedding_unavailable() {
        let backend = ProcessBackend::new("/does/not/exist");
        let err = backend.start().await.unwrap_err();
        assert!(matches!(err, CoreError::EmbeddingUnavailable(_)));
        assert!(!backend.is_ready().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_backend_roundtrip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-embedder");
        // Echo a fixed unit vector per request line, one request at a time
        std::fs::write(
            &tool,
            "#!/bin/sh\nwhile read line; do echo '{\"vectors\": [[1.0, 0.0]]}'; done\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&tool).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&tool, perms).unwrap();

        let backend = ProcessBackend::new(tool.to_string_lossy().to_string());
        backend.start().await.unwrap();
        assert!(backend.is_ready().await);

        let vectors = backend.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0]]);

        backend.stop().await;
        assert!(!backend.is_ready().await);
    }
}
