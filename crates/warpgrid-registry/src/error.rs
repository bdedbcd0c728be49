//! Error types for registry operations.

use std::fmt;

use thiserror::Error;
use warpgrid_keys::TemplateError;
use warpgrid_tree::TreeError;

use crate::revision::Revision;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Why a conditional write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// The directory moved since the caller read it.
    Revision { expected: Revision, actual: Revision },
    /// A create-only operation found the target already present.
    Exists,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revision { expected, actual } => {
                write!(f, "expected revision {expected}, found {actual}")
            }
            Self::Exists => f.write_str("already exists"),
        }
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict at {path}: {conflict}")]
    Conflict { path: String, conflict: Conflict },

    #[error("{} write(s) applied before {failed} failed: {source}", .applied.len())]
    PartiallyApplied {
        applied: Vec<String>,
        failed: String,
        #[source]
        source: TreeError,
    },

    #[error("invalid data at {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
