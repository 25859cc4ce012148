#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("embedding request to {provider} failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{0}")]
    Other(String),
}
