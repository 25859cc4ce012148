//! Chat memory over `SQLite` rows, per-card Qdrant collections and blob-backed bundles.

pub mod blob;
pub mod bundle;
pub mod collections;
pub mod error;
pub mod in_memory_store;
pub mod memory;
pub mod qdrant_ops;
pub mod sqlite;
pub mod types;
pub mod vector_store;

pub use blob::{BlobEntry, BlobError, BlobStore, CardData, CharacterData, MemoryBlobStore, PersonaForm};
pub use bundle::{BundleAssembler, CardBundle, ChatSearchItem, PersonaBundle, RecentChat};
pub use collections::{SearchHit, VectorCollectionStore, VECTOR_DIMENSION};
pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use memory::{Memory, RecallBundle, RecalledMessage};
pub use qdrant_ops::QdrantOps;
pub use sqlite::{SqliteStore, DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_CHATS_LIMIT};
pub use types::{CardId, ChatId, ChatMessage, EntityKey, MessageId, PersonaId, SenderType};
