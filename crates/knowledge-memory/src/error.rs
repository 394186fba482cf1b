//! Memory store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// Storage layer failure
    #[error("Storage error: {0}")]
    Storage(#[from] knowledge_storage::StorageError),

    /// Missing or malformed request fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No memory with this id belongs to the agent
    #[error("Memory {memory_id} not found for agent {agent_id}")]
    NotFound { agent_id: String, memory_id: String },

    /// Agent already holds the configured maximum
    #[error("Agent {agent_id} has reached maximum {max} memory items")]
    LimitReached { agent_id: String, max: usize },
}
