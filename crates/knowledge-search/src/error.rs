//! Search error types.

use thiserror::Error;

/// Errors raised by search input handling.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Unrecognized search mode
    #[error("Invalid search mode: {0} (expected keyword, graph or hybrid)")]
    InvalidMode(String),

    /// Invalid query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
