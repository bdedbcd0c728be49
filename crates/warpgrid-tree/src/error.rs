//! Error types for tree operations.

use thiserror::Error;

/// Result type alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors reported by a [`Tree`](crate::Tree) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("node already exists: {0}")]
    AlreadyExists(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("disconnected from coordination service")]
    Disconnected,

    #[error("backend error: {0}")]
    Backend(String),
}
