use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection already exists: {0}")]
    AlreadyExists(String),
    #[error("collection not found: {0}")]
    NotFound(String),
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("count error: {0}")]
    Count(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Payload = HashMap<String, serde_json::Value>;

/// Index settings applied when a collection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionParams {
    pub vector_size: u64,
    /// Point count above which segments are memory-mapped from disk.
    pub on_disk_threshold: u64,
    pub hnsw_on_disk: bool,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: u64,
    pub score: f32,
    pub payload: Payload,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    fn health_check(&self) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Create a collection. Fails with [`VectorStoreError::AlreadyExists`] if present.
    fn create_collection(
        &self,
        collection: &str,
        params: CollectionParams,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Delete a collection. Fails with [`VectorStoreError::NotFound`] if absent.
    fn delete_collection(&self, collection: &str)
    -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Upsert points and wait for the write to be acknowledged.
    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<u64>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;
}

impl<T: VectorStore + ?Sized> VectorStore for std::sync::Arc<T> {
    fn health_check(&self) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        (**self).health_check()
    }

    fn create_collection(
        &self,
        collection: &str,
        params: CollectionParams,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        (**self).create_collection(collection, params)
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        (**self).collection_exists(collection)
    }

    fn delete_collection(&self, collection: &str)
    -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        (**self).delete_collection(collection)
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        (**self).upsert(collection, points)
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        (**self).search(collection, vector, limit)
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<u64>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        (**self).delete_by_ids(collection, ids)
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        (**self).count(collection)
    }
}
