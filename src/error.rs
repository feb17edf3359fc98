//! Error Module
//!
//! A single error taxonomy shared by the stores, the index and the repository.
//! The HTTP layer maps each variant onto a status code.

use thiserror::Error;

/// Errors surfaced by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// The batch id or blob filename does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A metadata document exists but cannot be parsed as a batch record
    #[error("batch {id} has a corrupt config document: {reason}")]
    Corrupt { id: String, reason: String },

    /// Caller-supplied grid or placement values are outside their domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The underlying storage medium failed (permissions, disk, timeouts)
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
}

impl StoreError {
    /// Map an I/O error from a read path, turning a missing file into `NotFound`
    pub(crate) fn from_read(err: std::io::Error, what: impl Into<String>) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(what.into())
        } else {
            StoreError::StorageUnavailable(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
