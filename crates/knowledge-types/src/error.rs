//! Error types shared by the knowledge crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Settings failed to load or validate
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A client document was rejected before any write
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}
