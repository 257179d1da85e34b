use thiserror::Error;

use crate::batch::BatchId;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database operation failed
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Batch not found
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    /// Queue item not found
    #[error("queue item not found: {0}")]
    ItemNotFound(uuid::Uuid),

    /// Payload could not be serialized or deserialized
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}
