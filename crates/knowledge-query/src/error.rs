//! Query error types.

use thiserror::Error;

/// Malformed filter, update or sort input. Raised before anything is mutated.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Invalid sort: {0}")]
    InvalidSort(String),
}
