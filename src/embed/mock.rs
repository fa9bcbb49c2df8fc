use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CoreError;

use super::backend::EmbeddingBackend;

/// Deterministic hash-based embedding backend for testing.
pub struct MockBackend {
    dimension: usize,
    ready: AtomicBool,
}

impl MockBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ready: AtomicBool::new(false),
        }
    }

    /// A backend that is ready without an explicit `start` call.
    pub fn started(dimension: usize) -> Self {
        let backend = Self::new(dimension);
        backend.ready.store(true, Ordering::SeqCst);
        backend
    }

    fn text_to_vector(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();

        // Deterministic pseudo-random vector from the hash
        let mut vector = Vec::with_capacity(self.dimension);
        let mut seed = hash;
        for _ in 0..self.dimension {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let value = ((seed / 65536) % 1000) as f32 / 1000.0;
            vector.push(value);
        }

        // Normalize so cosine similarity behaves
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in vector.iter_mut() {
                *v /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    async fn start(&self) -> Result<(), CoreError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(CoreError::EmbeddingUnavailable(
                "mock backend not started".to_string(),
            ));
        }
        Ok(texts.iter().map(|t| self.text_to_vector(t)).collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_deterministic() {
        let backend = MockBackend::started(64);

        let texts = vec!["test text".to_string()];
        let vec1 = backend.embed(&texts).await.unwrap();
        let vec2 = backend.embed(&texts).await.unwrap();

        assert_eq!(vec1, vec2, "Same text should produce same vector");
    }

    #[tokio::test]
    async fn test_mock_backend_normalized() {
        let backend = MockBackend::started(64);
        let vectors = backend.embed(&["test".to_string()]).await.unwrap();

        let magnitude: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5, "Vector should be normalized");
    }

    #[tokio::test]
    async fn test_mock_backend_lifecycle() {
        let backend = MockBackend::new(8);
        assert!(!backend.is_ready().await);

        let err = backend.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, CoreError::EmbeddingUnavailable(_)));

        backend.start().await.unwrap();
        assert!(backend.is_ready().await);

        backend.stop().await;
        assert!(!backend.is_ready().await);
    }
}
