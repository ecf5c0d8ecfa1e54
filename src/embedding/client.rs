/// Embedding client enforcing the configured dimension
use super::{EmbeddingError, EmbeddingProvider, EmbeddingVector, RetryPolicy};
use std::sync::Arc;

/// Text-to-vector client used by the builder and the query engine
///
/// Every vector it returns has exactly `dimension` components. No caching: the same
/// text embedded twice makes two provider calls.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize, retry: RetryPolicy) -> Self {
        if provider.dimension() != dimension {
            tracing::warn!(
                "Provider {} reports {}D but {}D is configured, responses will be rejected",
                provider.model_name(),
                provider.dimension(),
                dimension
            );
        }

        Self {
            provider,
            dimension,
            retry,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed a single text
    pub fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let vector = self.retry.run(|| self.provider.embed(text))?;
        self.check(&vector)?;
        Ok(vector)
    }

    /// Embed several texts with a single provider request
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.retry.run(|| self.provider.embed_batch(texts))?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        for vector in &vectors {
            self.check(vector)?;
        }

        Ok(vectors)
    }

    fn check(&self, vector: &[f32]) -> Result<(), EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::Malformed {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
