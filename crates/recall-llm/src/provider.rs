use crate::error::LlmError;

/// Turns text into a dense vector for similarity search.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text` into a vector whose width is fixed by the backing model.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or returns no embedding.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn name(&self) -> &str;
}
