//! Test-only deterministic embedder.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::EmbeddingProvider;

/// Hashes text into a fixed-width bag-of-bytes vector.
///
/// Identical text always yields an identical vector, so a query equal to a stored
/// text scores a cosine similarity of 1.0 against it.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimension: usize,
    pub fail: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dimension: 384,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of `embed` calls made so far, including failed ones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }
        for (i, b) in text.bytes().enumerate() {
            let slot = (usize::from(b) * 31 + i) % self.dimension;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self.vector_for(text))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_same_vector() {
        let embedder = MockEmbedder::default();
        let a = embedder.embed("hello there").await.unwrap();
        let b = embedder.embed("hello there").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn failing_embedder_errors() {
        let embedder = MockEmbedder::failing();
        assert!(embedder.embed("x").await.is_err());
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn custom_dimension() {
        let embedder = MockEmbedder::with_dimension(300);
        assert_eq!(embedder.vector_for("abc").len(), 300);
    }

    proptest::proptest! {
        #[test]
        fn vector_mass_equals_byte_count(text in ".{0,64}") {
            let embedder = MockEmbedder::default();
            let sum: f32 = embedder.vector_for(&text).iter().sum();
            #[allow(clippy::cast_precision_loss)]
            let expected = text.len() as f32;
            proptest::prop_assert!((sum - expected).abs() < 1e-3);
        }
    }
}
