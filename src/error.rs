//! Error taxonomy shared by every repository and the pagination boundary.

use std::time::Duration;
use uuid::Uuid;

/// Coarse classification callers branch on (e.g. HTTP status mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The id is absent or soft-deleted. An expected outcome, not a failure.
    #[error("lamp {0} not found")]
    NotFound(Uuid),

    /// Malformed caller input (cursor, page size, id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored row could not be decoded back into a lamp.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Storage engine or I/O failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The operation hit its deadline or its caller went away.
    #[error("{operation} cancelled after {timeout:?}")]
    Cancelled {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RepositoryError::Cancelled { .. } => ErrorKind::Cancelled,
            RepositoryError::DataIntegrity(_)
            | RepositoryError::Storage(_)
            | RepositoryError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
