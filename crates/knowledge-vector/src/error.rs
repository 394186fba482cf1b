//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during vector and field index operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Storage layer failure
    #[error("Storage error: {0}")]
    Storage(#[from] knowledge_storage::StorageError),

    /// Dimension mismatch between a stored index and this build
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Unknown export format
    #[error("Invalid export format: {0} (expected json or csv)")]
    InvalidFormat(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for VectorError {
    fn from(e: serde_json::Error) -> Self {
        VectorError::Serialization(e.to_string())
    }
}
