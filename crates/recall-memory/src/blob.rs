//! Contract for the blob storage that holds card files, persona forms and avatars.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob backend error: {0}")]
    Backend(String),
}

/// A stored blob: its structured data plus an optional avatar reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry<D> {
    pub id: i64,
    pub data: D,
    pub avatar_uri: Option<String>,
}

/// Data that knows the key it is stored under.
pub trait BlobRecord {
    fn blob_key(&self) -> String;

    fn avatar_uri(&self) -> Option<String> {
        None
    }
}

pub trait BlobStore<D>: Send + Sync {
    /// Look up a blob by key.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::NotFound`] when no blob is stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<BlobEntry<D>, BlobError>> + Send;

    /// Store a new blob and return its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn post(&self, data: D) -> impl Future<Output = Result<i64, BlobError>> + Send;

    /// Replace the blob with the given ID.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::NotFound`] when `id` is unknown.
    fn put(&self, id: i64, data: D) -> impl Future<Output = Result<(), BlobError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// First line the character says when a chat starts.
    #[serde(default)]
    pub greeting: String,
}

/// Parsed contents of a character card file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub character: CharacterData,
}

impl BlobRecord for CardData {
    fn blob_key(&self) -> String {
        self.character.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub avatar_uri: Option<String>,
}

impl BlobRecord for PersonaForm {
    fn blob_key(&self) -> String {
        self.name.clone()
    }

    fn avatar_uri(&self) -> Option<String> {
        self.avatar_uri.clone()
    }
}

/// In-process blob store.
pub struct MemoryBlobStore<D> {
    entries: RwLock<HashMap<String, BlobEntry<D>>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl<D> Default for MemoryBlobStore<D> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            failing: AtomicBool::new(false),
        }
    }
}

impl<D> std::fmt::Debug for MemoryBlobStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("failing", &self.failing.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<D: Clone> MemoryBlobStore<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under an explicit key, replacing any existing entry. Returns the blob ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn insert(
        &self,
        key: impl Into<String>,
        data: D,
        avatar_uri: Option<String>,
    ) -> Result<i64, BlobError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .map_err(|e| BlobError::Backend(e.to_string()))?
            .insert(
                key.into(),
                BlobEntry {
                    id,
                    data,
                    avatar_uri,
                },
            );
        Ok(id)
    }

    /// Make every later call fail with [`BlobError::Backend`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BlobError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BlobError::Backend("blob store marked failing".into()))
        } else {
            Ok(())
        }
    }

    fn lookup(&self, key: &str) -> Result<BlobEntry<D>, BlobError> {
        self.check()?;
        self.entries
            .read()
            .map_err(|e| BlobError::Backend(e.to_string()))?
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_owned()))
    }
}

impl<D> BlobStore<D> for MemoryBlobStore<D>
where
    D: BlobRecord + Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<BlobEntry<D>, BlobError> {
        self.lookup(key)
    }

    async fn post(&self, data: D) -> Result<i64, BlobError> {
        self.check()?;
        let key = data.blob_key();
        let avatar = data.avatar_uri();
        self.insert(key, data, avatar)
    }

    async fn put(&self, id: i64, data: D) -> Result<(), BlobError> {
        self.check()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| BlobError::Backend(e.to_string()))?;
        let old_key = entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| BlobError::NotFound(format!("id {id}")))?;
        let previous = entries.remove(&old_key);
        let avatar_uri = data
            .avatar_uri()
            .or_else(|| previous.and_then(|p| p.avatar_uri));
        entries.insert(
            data.blob_key(),
            BlobEntry {
                id,
                data,
                avatar_uri,
            },
        );
        Ok(())
    }
}
