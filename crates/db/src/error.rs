//! Error taxonomy for reads and writes.
//!
//! Absence on a single-entity read is not an error: repositories return
//! `Ok(None)`. Everything else a caller can observe is a [`RepositoryError`].

use thiserror::Error;

use crate::row::HydrateError;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Connection or transport failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Data in the database cannot be mapped back into the domain
    /// (unknown enum text, wrong column type, missing column).
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A write targeted a row that does not exist.
    #[error("not found")]
    NotFound,

    /// Constraint violation (unique key, foreign key).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl RepositoryError {
    /// True for the generic storage-failure class: transport failures and
    /// stored data that does not decode.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::DataCorruption(_))
    }

    /// True when the caller may reasonably decide to retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict(_))
    }

    /// True for caller-initiated aborts.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<HydrateError> for RepositoryError {
    fn from(err: HydrateError) -> Self {
        Self::DataCorruption(err.to_string())
    }
}

impl From<mercato_core::UnknownVariant> for RepositoryError {
    fn from(err: mercato_core::UnknownVariant) -> Self {
        Self::DataCorruption(err.to_string())
    }
}
