mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values no store can work with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.memory.sqlite_path.trim().is_empty() {
            bail!("memory.sqlite_path must not be empty");
        }
        if self.memory.history_limit == 0 {
            bail!("memory.history_limit must be greater than 0");
        }
        if self.memory.recent_chats_limit == 0 {
            bail!("memory.recent_chats_limit must be greater than 0");
        }
        if self.vector.enabled && !is_http_url(&self.vector.qdrant_url) {
            bail!(
                "vector.qdrant_url must be an http(s) URL, got {:?}",
                self.vector.qdrant_url
            );
        }
        if !is_http_url(&self.embedding.base_url) {
            bail!(
                "embedding.base_url must be an http(s) URL, got {:?}",
                self.embedding.base_url
            );
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
