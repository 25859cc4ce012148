use crate::blob::BlobError;
use crate::vector_store::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(#[source] sqlx::Error),

    #[error("blob lookup failed for {key}: {source}")]
    BlobLookupFailed {
        key: String,
        #[source]
        source: BlobError,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("database error: {0}")]
    Sqlite(sqlx::Error),

    #[error("vector store error: {0}")]
    VectorStore(VectorStoreError),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("LLM error: {0}")]
    Llm(#[from] recall_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl From<sqlx::Error> for MemoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::StoreUnavailable(e.to_string())
            }
            other => Self::Sqlite(other),
        }
    }
}

impl From<VectorStoreError> for MemoryError {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::Connection(msg) => Self::StoreUnavailable(msg),
            VectorStoreError::NotFound(name) => Self::NotFound(format!("collection {name}")),
            VectorStoreError::AlreadyExists(name) => Self::CollectionAlreadyExists(name),
            VectorStoreError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            other => Self::VectorStore(other),
        }
    }
}

impl MemoryError {
    /// Whether the failure means the backing service could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_unavailable() {
        let err = MemoryError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_unavailable());
        let err = MemoryError::from(sqlx::Error::PoolClosed);
        assert!(err.is_unavailable());
    }

    #[test]
    fn row_not_found_stays_sqlite() {
        let err = MemoryError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, MemoryError::Sqlite(_)));
    }

    #[test]
    fn vector_errors_map_to_taxonomy() {
        assert!(
            MemoryError::from(VectorStoreError::Connection("refused".into())).is_unavailable()
        );
        assert!(matches!(
            MemoryError::from(VectorStoreError::NotFound("5".into())),
            MemoryError::NotFound(msg) if msg == "collection 5"
        ));
        assert!(matches!(
            MemoryError::from(VectorStoreError::AlreadyExists("5".into())),
            MemoryError::CollectionAlreadyExists(name) if name == "5"
        ));
        assert!(matches!(
            MemoryError::from(VectorStoreError::DimensionMismatch {
                expected: 384,
                actual: 300
            }),
            MemoryError::DimensionMismatch {
                expected: 384,
                actual: 300
            }
        ));
        assert!(matches!(
            MemoryError::from(VectorStoreError::Search("boom".into())),
            MemoryError::VectorStore(_)
        ));
    }

    #[test]
    fn display_includes_context() {
        let err = MemoryError::DimensionMismatch {
            expected: 384,
            actual: 300,
        };
        assert_eq!(
            err.to_string(),
            "vector dimension mismatch: expected 384, got 300"
        );
    }
}
