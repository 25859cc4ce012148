//! Embedding provider abstraction and backend implementations.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use error::LlmError;
pub use provider::EmbeddingProvider;
