//! Per-entity vector collections.
//!
//! Every card owns one collection, named by its stringified row ID. Personas own
//! none, so a persona and a card sharing a row ID never share a collection.
//! Points inside a collection are keyed by the integer ID of the relational
//! record they describe, so search hits join straight back to rows.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MemoryError;
use crate::types::EntityKey;
use crate::vector_store::{CollectionParams, Payload, VectorPoint, VectorStore};

/// Width of every embedding stored by this crate.
pub const VECTOR_DIMENSION: usize = 384;

/// Point count above which collection segments are memory-mapped from disk.
pub const ON_DISK_THRESHOLD: u64 = 20_000;

/// One nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: i64,
    pub score: f32,
    pub payload: Payload,
}

pub struct VectorCollectionStore {
    backend: Box<dyn VectorStore>,
    connected: AtomicBool,
}

impl std::fmt::Debug for VectorCollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorCollectionStore")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl VectorCollectionStore {
    /// Wrap a backend. No I/O happens until [`connect`](Self::connect) or the first operation.
    #[must_use]
    pub fn new(backend: Box<dyn VectorStore>) -> Self {
        Self {
            backend,
            connected: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Verify the index service is reachable. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::StoreUnavailable`] if the health check fails. The store
    /// stays disconnected and the next call retries.
    pub async fn connect(&self) -> Result<(), MemoryError> {
        if self.is_connected() {
            return Ok(());
        }
        match self.backend.health_check().await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                tracing::info!("vector store connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("vector store health check failed: {e}");
                Err(MemoryError::StoreUnavailable(e.to_string()))
            }
        }
    }

    /// Mark the store disconnected. The next operation reconnects.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("vector store closed");
        }
    }

    fn track<T>(&self, result: Result<T, MemoryError>) -> Result<T, MemoryError> {
        if let Err(e) = &result
            && e.is_unavailable()
        {
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Create the collection owned by `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CollectionAlreadyExists`] if the entity already has one.
    pub async fn create_collection(&self, entity: impl Into<EntityKey>) -> Result<(), MemoryError> {
        let name = entity.into().collection_name();
        self.connect().await?;
        let params = CollectionParams {
            vector_size: VECTOR_DIMENSION as u64,
            on_disk_threshold: ON_DISK_THRESHOLD,
            hnsw_on_disk: true,
        };
        let result = self
            .backend
            .create_collection(&name, params)
            .await
            .map_err(MemoryError::from);
        self.track(result)?;
        tracing::debug!(collection = %name, "created vector collection");
        Ok(())
    }

    /// Upsert the point describing `entity` itself; the point ID is the entity ID.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::DimensionMismatch`] when `vector` is not
    /// [`VECTOR_DIMENSION`] wide, [`MemoryError::NotFound`] when the collection is missing.
    pub async fn insert(
        &self,
        entity: impl Into<EntityKey>,
        vector: Vec<f32>,
        payload: Payload,
    ) -> Result<(), MemoryError> {
        let key = entity.into();
        self.insert_record(key, key.0, vector, payload).await
    }

    /// Upsert one point for a record owned by `entity`, e.g. a message in a card collection.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert); negative record IDs fail with
    /// [`MemoryError::IntConversion`].
    pub async fn insert_record(
        &self,
        entity: impl Into<EntityKey>,
        record_id: i64,
        vector: Vec<f32>,
        payload: Payload,
    ) -> Result<(), MemoryError> {
        check_dimension(&vector)?;
        let name = entity.into().collection_name();
        let point = VectorPoint {
            id: u64::try_from(record_id)?,
            vector,
            payload,
        };
        self.connect().await?;
        let result = self
            .backend
            .upsert(&name, vec![point])
            .await
            .map_err(MemoryError::from);
        self.track(result)?;
        tracing::debug!(collection = %name, record_id, "upserted point");
        Ok(())
    }

    /// Nearest `limit` points to `query`, most similar first.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] for a missing collection and
    /// [`MemoryError::DimensionMismatch`] for a query of the wrong width.
    pub async fn search(
        &self,
        entity: impl Into<EntityKey>,
        query: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        check_dimension(&query)?;
        let name = entity.into().collection_name();
        let limit = u64::try_from(limit)?;
        self.connect().await?;
        let result = self
            .backend
            .search(&name, query, limit)
            .await
            .map_err(MemoryError::from);
        let points = self.track(result)?;

        let hits = points
            .into_iter()
            .map(|p| {
                Ok(SearchHit {
                    id: i64::try_from(p.id)?,
                    score: p.score,
                    payload: p.payload,
                })
            })
            .collect::<Result<Vec<_>, MemoryError>>()?;
        tracing::debug!(collection = %name, hits = hits.len(), "vector search");
        Ok(hits)
    }

    /// Remove points by record ID. An empty list is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] if the collection is missing.
    pub async fn delete_records(
        &self,
        entity: impl Into<EntityKey>,
        ids: &[i64],
    ) -> Result<(), MemoryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let name = entity.into().collection_name();
        let ids = ids
            .iter()
            .map(|&id| u64::try_from(id))
            .collect::<Result<Vec<_>, _>>()?;
        let removed = ids.len();
        self.connect().await?;
        let result = self
            .backend
            .delete_by_ids(&name, ids)
            .await
            .map_err(MemoryError::from);
        self.track(result)?;
        tracing::debug!(collection = %name, removed, "deleted points");
        Ok(())
    }

    /// Exact number of points in the entity's collection.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] if the collection is missing.
    pub async fn count(&self, entity: impl Into<EntityKey>) -> Result<u64, MemoryError> {
        let name = entity.into().collection_name();
        self.connect().await?;
        let result = self.backend.count(&name).await.map_err(MemoryError::from);
        self.track(result)
    }

    /// Drop the entity's collection and every point in it.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] if the collection is missing.
    pub async fn delete_collection(
        &self,
        entity: impl Into<EntityKey>,
    ) -> Result<bool, MemoryError> {
        let name = entity.into().collection_name();
        self.connect().await?;
        let result = self
            .backend
            .delete_collection(&name)
            .await
            .map_err(MemoryError::from);
        let deleted = self.track(result)?;
        tracing::debug!(collection = %name, "deleted vector collection");
        Ok(deleted)
    }

    /// # Errors
    ///
    /// Returns an error if the index service cannot be reached.
    pub async fn collection_exists(&self, entity: impl Into<EntityKey>) -> Result<bool, MemoryError> {
        let name = entity.into().collection_name();
        self.connect().await?;
        let result = self
            .backend
            .collection_exists(&name)
            .await
            .map_err(MemoryError::from);
        self.track(result)
    }
}

fn check_dimension(vector: &[f32]) -> Result<(), MemoryError> {
    if vector.len() == VECTOR_DIMENSION {
        Ok(())
    } else {
        Err(MemoryError::DimensionMismatch {
            expected: VECTOR_DIMENSION,
            actual: vector.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::in_memory_store::InMemoryVectorStore;
    use crate::types::CardId;

    fn unit(slot: usize) -> Vec<f32> {
        let mut v = vec![0.0; VECTOR_DIMENSION];
        v[slot] = 1.0;
        v
    }

    fn store() -> VectorCollectionStore {
        VectorCollectionStore::new(Box::new(InMemoryVectorStore::new()))
    }

    #[tokio::test]
    async fn operations_connect_lazily() {
        let store = store();
        assert!(!store.is_connected());
        store.create_collection(CardId(1)).await.unwrap();
        assert!(store.is_connected());
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_close_reconnects() {
        let store = store();
        store.connect().await.unwrap();
        store.connect().await.unwrap();
        store.close();
        assert!(!store.is_connected());
        assert!(!store.collection_exists(CardId(1)).await.unwrap());
        assert!(store.is_connected());
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable_then_recovers() {
        let backend = Arc::new(InMemoryVectorStore::new());
        let store = VectorCollectionStore::new(Box::new(Arc::clone(&backend)));

        backend.set_available(false);
        let err = store.connect().await.unwrap_err();
        assert!(matches!(err, MemoryError::StoreUnavailable(_)));
        assert!(!store.is_connected());

        backend.set_available(true);
        store.create_collection(CardId(3)).await.unwrap();

        backend.set_available(false);
        let err = store.count(CardId(3)).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(!store.is_connected());

        backend.set_available(true);
        assert_eq!(store.count(CardId(3)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let store = store();
        store.create_collection(CardId(1)).await.unwrap();
        let err = store.create_collection(CardId(1)).await.unwrap_err();
        assert!(matches!(err, MemoryError::CollectionAlreadyExists(name) if name == "1"));
    }

    #[tokio::test]
    async fn deleted_collection_search_is_not_found() {
        let store = store();
        store.create_collection(CardId(4)).await.unwrap();
        assert!(store.delete_collection(CardId(4)).await.unwrap());
        let err = store.search(CardId(4), unit(0), 5).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_collection_is_not_found() {
        let store = store();
        let err = store.delete_collection(CardId(8)).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn inserted_vector_is_its_own_nearest_neighbour() {
        let store = store();
        store.create_collection(CardId(2)).await.unwrap();
        let payload = Payload::from([("name".to_owned(), serde_json::json!("Ada"))]);
        store
            .insert(CardId(2), unit(7), payload.clone())
            .await
            .unwrap();
        store
            .insert_record(CardId(2), 90, unit(8), Payload::new())
            .await
            .unwrap();

        let hits = store.search(CardId(2), unit(7), 2).await.unwrap();
        assert_eq!(hits[0].id, 2);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[0].payload, payload);
        assert_eq!(hits[1].id, 90);
    }

    #[tokio::test]
    async fn wrong_width_insert_leaves_count_unchanged() {
        let store = store();
        store.create_collection(CardId(5)).await.unwrap();
        store.insert(CardId(5), unit(0), Payload::new()).await.unwrap();

        let err = store
            .insert_record(CardId(5), 6, vec![0.5; 300], Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 384,
                actual: 300
            }
        ));
        assert_eq!(store.count(CardId(5)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_width_query_is_rejected() {
        let store = store();
        store.create_collection(CardId(5)).await.unwrap();
        let err = store.search(CardId(5), vec![1.0; 3], 1).await.unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { actual: 3, .. }));
    }

    #[tokio::test]
    async fn empty_collection_search_is_empty() {
        let store = store();
        store.create_collection(CardId(9)).await.unwrap();
        assert!(store.search(CardId(9), unit(1), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_id_overwrites_point() {
        let store = store();
        store.create_collection(CardId(1)).await.unwrap();
        store.insert_record(CardId(1), 10, unit(0), Payload::new()).await.unwrap();
        store.insert_record(CardId(1), 10, unit(1), Payload::new()).await.unwrap();
        assert_eq!(store.count(CardId(1)).await.unwrap(), 1);
        let hits = store.search(CardId(1), unit(1), 1).await.unwrap();
        assert_eq!(hits[0].id, 10);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn delete_records_prunes_points() {
        let store = store();
        store.create_collection(CardId(1)).await.unwrap();
        for id in 1..=3 {
            store
                .insert_record(CardId(1), id, unit(usize::try_from(id).unwrap()), Payload::new())
                .await
                .unwrap();
        }
        store.delete_records(CardId(1), &[]).await.unwrap();
        assert_eq!(store.count(CardId(1)).await.unwrap(), 3);
        store.delete_records(CardId(1), &[1, 3]).await.unwrap();
        assert_eq!(store.count(CardId(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_records_in_missing_collection_is_not_found() {
        let store = store();
        let err = store.delete_records(CardId(6), &[1]).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn negative_record_id_is_rejected() {
        let store = store();
        store.create_collection(CardId(1)).await.unwrap();
        let err = store
            .insert_record(CardId(1), -1, unit(0), Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::IntConversion(_)));
    }
}
