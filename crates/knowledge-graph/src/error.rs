//! Graph error types.

use thiserror::Error;

/// Errors that can occur during graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
