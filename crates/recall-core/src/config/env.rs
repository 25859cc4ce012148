use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RECALL_SQLITE_PATH") {
            self.memory.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("RECALL_HISTORY_LIMIT") {
            match v.parse::<u32>() {
                Ok(limit) => self.memory.history_limit = limit,
                Err(_) => tracing::warn!("ignoring invalid RECALL_HISTORY_LIMIT value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("RECALL_RECENT_CHATS_LIMIT") {
            match v.parse::<u32>() {
                Ok(limit) => self.memory.recent_chats_limit = limit,
                Err(_) => tracing::warn!("ignoring invalid RECALL_RECENT_CHATS_LIMIT value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("RECALL_QDRANT_URL") {
            self.vector.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("RECALL_VECTOR_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.vector.enabled = enabled;
        }
        if let Ok(v) = std::env::var("RECALL_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("RECALL_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("RECALL_LOG_FILTER") {
            self.observability.log_filter = v;
        }
    }
}
