//! Error types for storage operations.

use std::time::Duration;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// A version mismatch is not an error at this layer: it is reported as
/// [`crate::CasOutcome::Conflict`] so callers can tell a lost race apart
/// from a broken backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached.
    #[error("{backend} backend is unavailable")]
    Unavailable {
        /// Name of the backend that rejected the call.
        backend: &'static str,
    },

    /// Waiting for an exclusive hold ran past the caller's deadline.
    #[error("timed out after {waited:?} waiting for exclusive hold on {key}")]
    LockTimeout {
        /// Display form of the contended key.
        key: String,
        /// How long the caller actually waited.
        waited: Duration,
    },

    /// A hold was presented to a backend that did not issue it, or for a
    /// different record than the one being saved.
    #[error("exclusive hold for {held} cannot be used to write {target}")]
    ForeignHold {
        /// Key covered by the hold.
        held: String,
        /// Key of the record being written.
        target: String,
    },

    /// A record with the same identifier already exists.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// Display form of the existing key.
        key: String,
    },

    /// A stored document could not be decoded or encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The stored data violates a backend invariant.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A field value was rejected by the record model.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl StorageError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true if the error reflects a connectivity or I/O fault
    /// rather than a property of the request.
    #[must_use]
    pub fn is_backend_fault(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Codec(_) | Self::Corrupted(_)
        )
    }
}
