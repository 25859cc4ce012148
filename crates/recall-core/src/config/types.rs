use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Page size for chat history reads.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    #[serde(default = "default_recent_chats_limit")]
    pub recent_chats_limit: u32,
}

fn default_sqlite_path() -> String {
    "./data/recall.db".into()
}

fn default_history_limit() -> u32 {
    recall_memory::DEFAULT_HISTORY_LIMIT
}

fn default_recent_chats_limit() -> u32 {
    recall_memory::DEFAULT_RECENT_CHATS_LIMIT
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            history_limit: default_history_limit(),
            recent_chats_limit: default_recent_chats_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    /// When `false`, vectors live in process memory and are lost on exit.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

fn default_true() -> bool {
    true
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            qdrant_url: default_qdrant_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    /// Must produce 384-component vectors.
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_embedding_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "all-minilm".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// `tracing-subscriber` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}
