//! Qdrant-backed [`VectorStore`] implementation.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    HnswConfigDiffBuilder, OptimizersConfigDiffBuilder, PointId, PointStruct, PointsIdsList,
    ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    point_id::PointIdOptions, value::Kind,
};

use crate::vector_store::{
    CollectionParams, Payload, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Thin wrapper over [`Qdrant`] client encapsulating per-entity collection operations.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` for the given gRPC URL.
    ///
    /// The underlying channel connects lazily; use [`QdrantOps::health_check`] to
    /// verify the service is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> QdrantResult<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self { client })
    }

    /// Access the underlying Qdrant client for advanced operations.
    #[must_use]
    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    /// Ping the service.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached.
    pub async fn health_check(&self) -> QdrantResult<()> {
        self.client.health_check().await.map_err(Box::new)?;
        Ok(())
    }

    /// Check whether a collection exists.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached.
    pub async fn collection_exists(&self, collection: &str) -> QdrantResult<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(Box::new)
    }

    /// Create a cosine-distance collection with on-disk HNSW and a memmap threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if collection creation fails.
    #[allow(deprecated)]
    pub async fn create_collection(&self, collection: &str, params: CollectionParams) -> QdrantResult<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(params.vector_size, Distance::Cosine))
                    .optimizers_config(
                        OptimizersConfigDiffBuilder::default()
                            .memmap_threshold(params.on_disk_threshold),
                    )
                    .hnsw_config(HnswConfigDiffBuilder::default().on_disk(params.hnsw_on_disk)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Delete a collection, returning the service acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be deleted.
    pub async fn delete_collection(&self, collection: &str) -> QdrantResult<bool> {
        let response = self
            .client
            .delete_collection(collection)
            .await
            .map_err(Box::new)?;
        Ok(response.result)
    }

    /// Upsert points into a collection and wait for the write to be applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, collection: &str, points: Vec<PointStruct>) -> QdrantResult<()> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Search for similar vectors, returning scored points with payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    /// Delete points by their IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub async fn delete_by_ids(&self, collection: &str, ids: Vec<PointId>) -> QdrantResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Exact number of points stored in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the count request fails.
    pub async fn count(&self, collection: &str) -> QdrantResult<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(Box::new)?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    /// Convert a JSON payload map to a Qdrant payload map.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if deserialization fails.
    pub fn json_to_payload(
        payload: Payload,
    ) -> Result<HashMap<String, qdrant_client::qdrant::Value>, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect()))
    }

    async fn require_collection(&self, collection: &str) -> Result<(), VectorStoreError> {
        let exists = self
            .collection_exists(collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        if exists {
            Ok(())
        } else {
            Err(VectorStoreError::NotFound(collection.to_owned()))
        }
    }
}

impl VectorStore for QdrantOps {
    fn health_check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), VectorStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            self.health_check()
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn create_collection(
        &self,
        collection: &str,
        params: CollectionParams,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), VectorStoreError>> + Send + '_>>
    {
        let collection = collection.to_owned();
        Box::pin(async move {
            let exists = self
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            if exists {
                return Err(VectorStoreError::AlreadyExists(collection));
            }
            self.create_collection(&collection, params)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn collection_exists(
        &self,
        collection: &str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<bool, VectorStoreError>> + Send + '_>,
    > {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(
        &self,
        collection: &str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<bool, VectorStoreError>> + Send + '_>,
    > {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.require_collection(&collection).await?;
            self.delete_collection(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), VectorStoreError>> + Send + '_>>
    {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.require_collection(&collection).await?;
            let qdrant_points = points
                .into_iter()
                .map(|p| {
                    let payload = Self::json_to_payload(p.payload)
                        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                    Ok(PointStruct::new(p.id, p.vector, payload))
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()?;
            self.upsert(&collection, qdrant_points)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<Output = Result<Vec<ScoredVectorPoint>, VectorStoreError>>
                + Send
                + '_,
        >,
    > {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.require_collection(&collection).await?;
            let results = self
                .search(&collection, vector, limit)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().filter_map(scored_point_to_vector).collect())
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<u64>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), VectorStoreError>> + Send + '_>>
    {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.require_collection(&collection).await?;
            let point_ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            self.delete_by_ids(&collection, point_ids)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn count(
        &self,
        collection: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u64, VectorStoreError>> + Send + '_>>
    {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.require_collection(&collection).await?;
            self.count(&collection)
                .await
                .map_err(|e| VectorStoreError::Count(e.to_string()))
        })
    }
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

/// Numeric point IDs only: every point this crate writes is keyed by a row ID.
fn scored_point_to_vector(point: ScoredPoint) -> Option<ScoredVectorPoint> {
    let id = match point.id.and_then(|pid| pid.point_id_options)? {
        PointIdOptions::Num(n) => n,
        PointIdOptions::Uuid(_) => return None,
    };

    let payload: Payload = point
        .payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect();

    Some(ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    })
}
