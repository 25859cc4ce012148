//! Store construction from configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use recall_llm::EmbeddingProvider;
use recall_llm::ollama::OllamaEmbedder;
use recall_memory::blob::{BlobStore, CardData, PersonaForm};
use recall_memory::{InMemoryVectorStore, Memory, QdrantOps, SqliteStore, VectorCollectionStore};

use crate::config::Config;

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve the config path, load the file with env overrides and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed or fails validation.
    pub fn from_env() -> anyhow::Result<Self> {
        let config_path = resolve_config_path();
        let config = Config::load(&config_path)?;
        Self::new(config, config_path)
    }

    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: Config, config_path: PathBuf) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Open the `SQLite` database, creating its parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database cannot be opened.
    pub async fn build_sqlite(&self) -> anyhow::Result<SqliteStore> {
        let path = &self.config.memory.sqlite_path;
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        SqliteStore::new(path)
            .await
            .with_context(|| format!("failed to open sqlite database at {path}"))
    }

    /// Vector collections backed by Qdrant, or by process memory when vectors are
    /// disabled or the Qdrant client cannot be built.
    #[must_use]
    pub fn build_vectors(&self) -> VectorCollectionStore {
        if !self.config.vector.enabled {
            tracing::info!("vector store disabled, using in-memory collections");
            return VectorCollectionStore::new(Box::new(InMemoryVectorStore::new()));
        }
        match QdrantOps::new(&self.config.vector.qdrant_url) {
            Ok(ops) => VectorCollectionStore::new(Box::new(ops)),
            Err(e) => {
                tracing::warn!(
                    url = %self.config.vector.qdrant_url,
                    "failed to build Qdrant client, falling back to in-memory collections: {e:#}"
                );
                VectorCollectionStore::new(Box::new(InMemoryVectorStore::new()))
            }
        }
    }

    #[must_use]
    pub fn build_embedder(&self) -> OllamaEmbedder {
        OllamaEmbedder::new(
            &self.config.embedding.base_url,
            self.config.embedding.model.clone(),
        )
    }

    /// Assemble the memory facade around the configured stores and embedder.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` store cannot be opened.
    pub async fn build_memory<C, P>(
        &self,
        cards: C,
        personas: P,
    ) -> anyhow::Result<Memory<C, P, OllamaEmbedder>>
    where
        C: BlobStore<CardData>,
        P: BlobStore<PersonaForm>,
    {
        self.build_memory_with(cards, personas, self.build_embedder())
            .await
    }

    /// Same as [`build_memory`](Self::build_memory) with a caller-supplied embedder.
    ///
    /// An unreachable vector service is logged, not fatal: the store reconnects
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` store cannot be opened.
    pub async fn build_memory_with<C, P, E>(
        &self,
        cards: C,
        personas: P,
        embedder: E,
    ) -> anyhow::Result<Memory<C, P, E>>
    where
        C: BlobStore<CardData>,
        P: BlobStore<PersonaForm>,
        E: EmbeddingProvider,
    {
        let sqlite = self.build_sqlite().await?;
        let vectors = self.build_vectors();
        if let Err(e) = vectors.connect().await {
            tracing::warn!("vector store not reachable yet, will retry lazily: {e}");
        }
        tracing::info!(embedder = embedder.name(), "memory ready");
        let limits = &self.config.memory;
        Ok(Memory::new(sqlite, vectors, cards, personas, embedder)
            .with_limits(limits.history_limit, limits.recent_chats_limit))
    }
}

/// `RECALL_CONFIG` if set, else `config/default.toml`.
#[must_use]
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("RECALL_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

#[cfg(test)]
mod tests {
    use recall_llm::mock::MockEmbedder;
    use recall_memory::MemoryBlobStore;
    use serial_test::serial;

    use super::*;

    fn offline_config(sqlite_path: &str) -> Config {
        let mut config = Config::default();
        config.memory.sqlite_path = sqlite_path.into();
        config.vector.enabled = false;
        config
    }

    #[test]
    #[serial]
    fn resolve_config_path_prefers_env() {
        unsafe { std::env::set_var("RECALL_CONFIG", "/tmp/recall.toml") };
        assert_eq!(resolve_config_path(), PathBuf::from("/tmp/recall.toml"));
        unsafe { std::env::remove_var("RECALL_CONFIG") };
        assert_eq!(resolve_config_path(), PathBuf::from("config/default.toml"));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = Config::default();
        config.memory.history_limit = 0;
        let err = AppBuilder::new(config, PathBuf::from("x.toml")).err().unwrap();
        assert!(format!("{err:#}").contains("history_limit"));
    }

    #[tokio::test]
    async fn build_sqlite_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/deeper/recall.db");
        let builder = AppBuilder::new(
            offline_config(db.to_str().unwrap()),
            PathBuf::from("config/default.toml"),
        )
        .unwrap();
        builder.build_sqlite().await.unwrap();
        assert!(db.exists());
    }

    #[tokio::test]
    async fn disabled_vectors_use_memory_backend() {
        let builder = AppBuilder::new(offline_config(":memory:"), PathBuf::new()).unwrap();
        let vectors = builder.build_vectors();
        vectors.connect().await.unwrap();
        assert!(vectors.is_connected());
    }

    #[tokio::test]
    async fn build_memory_with_mock_embedder() {
        let builder = AppBuilder::new(offline_config(":memory:"), PathBuf::new()).unwrap();
        let cards = MemoryBlobStore::<CardData>::new();
        cards
            .insert(
                "ada.json",
                CardData {
                    character: recall_memory::CharacterData {
                        name: "Ada".into(),
                        description: String::new(),
                        greeting: "Hi.".into(),
                    },
                },
                None,
            )
            .unwrap();
        let memory = builder
            .build_memory_with(
                cards,
                MemoryBlobStore::<PersonaForm>::new(),
                MockEmbedder::default(),
            )
            .await
            .unwrap();

        let card = memory.create_card("ada.json").await.unwrap();
        let chat = memory.start_chat(card, None).await.unwrap();
        memory.record_turn(chat, "hello", "hi").await.unwrap();
        assert_eq!(memory.vectors().count(card).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn build_memory_applies_configured_limits() {
        let mut config = offline_config(":memory:");
        config.memory.history_limit = 1;
        config.memory.recent_chats_limit = 1;
        let builder = AppBuilder::new(config, PathBuf::new()).unwrap();
        let cards = MemoryBlobStore::<CardData>::new();
        cards
            .insert(
                "bo.json",
                CardData {
                    character: recall_memory::CharacterData {
                        name: "Bo".into(),
                        description: String::new(),
                        greeting: "Yo.".into(),
                    },
                },
                None,
            )
            .unwrap();
        let memory = builder
            .build_memory_with(
                cards,
                MemoryBlobStore::<PersonaForm>::new(),
                MockEmbedder::default(),
            )
            .await
            .unwrap();

        let card = memory.create_card("bo.json").await.unwrap();
        let chat = memory.start_chat(card, None).await.unwrap();
        memory.record_turn(chat, "hey", "sup").await.unwrap();
        memory.start_chat(card, None).await.unwrap();

        assert_eq!(memory.history(chat, None).await.unwrap().len(), 1);
        assert_eq!(memory.recent_chats().await.unwrap().len(), 1);
    }

    #[test]
    fn embedder_uses_configured_model() {
        let builder = AppBuilder::new(Config::default(), PathBuf::new()).unwrap();
        assert_eq!(builder.build_embedder().model(), "all-minilm");
    }
}
