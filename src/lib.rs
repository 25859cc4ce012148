//! Hybrid chat memory: `SQLite` entities, per-card vector collections and
//! blob-backed bundles.
//!
//! ```no_run
//! use recall::{AppBuilder, CardData, MemoryBlobStore, PersonaForm};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let builder = AppBuilder::from_env()?;
//! recall::init_subscriber(&builder.config().observability.log_filter)?;
//! let memory = builder
//!     .build_memory(
//!         MemoryBlobStore::<CardData>::new(),
//!         MemoryBlobStore::<PersonaForm>::new(),
//!     )
//!     .await?;
//! let recent = memory.bundles().recent_chats(20).await?;
//! # let _ = recent;
//! # Ok(())
//! # }
//! ```

pub use recall_core::config::{self, Config};
pub use recall_core::{AppBuilder, bootstrap};
pub use recall_llm::{EmbeddingProvider, LlmError, ollama::OllamaEmbedder};
pub use recall_memory::{
    BlobEntry, BlobError, BlobStore, BundleAssembler, CardBundle, CardData, CardId,
    CharacterData, ChatId, ChatMessage, ChatSearchItem, InMemoryVectorStore, Memory,
    MemoryBlobStore, MemoryError, MessageId, PersonaBundle, PersonaForm, PersonaId,
    QdrantOps, RecallBundle, RecalledMessage, RecentChat, SearchHit, SenderType, SqliteStore,
    VECTOR_DIMENSION, VectorCollectionStore,
};

/// Install a global `tracing` subscriber writing formatted events to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set.
///
/// # Errors
///
/// Returns an error if `default_filter` is not a valid directive or a global
/// subscriber is already installed.
pub fn init_subscriber(default_filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(default_filter)?,
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    tracing::debug!("tracing subscriber installed");
    Ok(())
}
