//! Service error types.

use thiserror::Error;

/// Errors surfaced by [`crate::KnowledgeEngine`].
///
/// Expected empty outcomes (missing document, version or index) are values,
/// not errors. Everything here is either malformed input, a conflict the
/// caller may retry, or an infrastructure failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] knowledge_storage::StorageError),

    #[error(transparent)]
    Query(#[from] knowledge_query::QueryError),

    #[error("Graph error: {0}")]
    Graph(#[from] knowledge_graph::GraphError),

    #[error("Search error: {0}")]
    Search(#[from] knowledge_search::SearchError),

    #[error("Index error: {0}")]
    Vector(#[from] knowledge_vector::VectorError),

    #[error("Memory error: {0}")]
    Memory(#[from] knowledge_memory::MemoryStoreError),

    #[error(transparent)]
    Knowledge(#[from] knowledge_types::KnowledgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Optimistic version check failed; reload and retry
    #[error("Version conflict on {doc_id}: expected {expected}, found {actual}")]
    Conflict {
        doc_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Import error: {0}")]
    Interchange(String),
}

impl ServiceError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Knowledge(knowledge_types::KnowledgeError::Serialization(e))
    }
}
