//! Error types for StockLock core.

use std::fmt;
use std::time::Duration;
use stocklock_storage::{StorageError, Version};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by store operations.
///
/// The core never retries. Every failure is handed back to the caller
/// classified by [`ErrorKind`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// The addressed record does not exist.
    #[error("{id} not found")]
    NotFound {
        /// Display form of the requested id.
        id: String,
    },

    /// The record changed between read and write, or was being written
    /// under an exclusive hold at commit time.
    #[error(
        "version conflict on {id}: {}",
        describe_conflict(.expected, .actual.as_ref(), .held)
    )]
    VersionConflict {
        /// Display form of the record id.
        id: String,
        /// Version the operation read.
        expected: Version,
        /// Version found at commit time, `None` if the record was deleted.
        actual: Option<Version>,
        /// True if the write was refused because another caller held the
        /// record.
        held: bool,
    },

    /// A decrease asked for more than the record holds.
    #[error("insufficient quantity on {id}: requested {requested}, available {available}")]
    InsufficientQuantity {
        /// Display form of the record id.
        id: String,
        /// Quantity in the state the guard was evaluated against.
        available: u32,
        /// Amount the caller asked to remove.
        requested: u32,
    },

    /// The exclusive hold was not granted before the deadline.
    #[error("timed out after {waited:?} waiting for exclusive hold on {id}")]
    LockTimeout {
        /// Display form of the contended id.
        id: String,
        /// How long the operation waited.
        waited: Duration,
    },

    /// The backend failed for reasons unrelated to the request.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] StorageError),

    /// The request was rejected before touching storage.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },
}

fn describe_conflict(expected: &Version, actual: Option<&Version>, held: &bool) -> String {
    match actual {
        Some(version) if *held => format!("held by an exclusive writer at {version}"),
        Some(version) => format!("read {expected}, stored {version}"),
        None => format!("read {expected}, stored nothing (deleted)"),
    }
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(id: impl fmt::Display) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Creates a version conflict error.
    pub fn version_conflict(
        id: impl fmt::Display,
        expected: Version,
        actual: Option<Version>,
    ) -> Self {
        Self::VersionConflict {
            id: id.to_string(),
            expected,
            actual,
            held: false,
        }
    }

    /// Creates a version conflict for a write refused because the record
    /// was held at `version`.
    pub fn held_conflict(id: impl fmt::Display, version: Version) -> Self {
        Self::VersionConflict {
            id: id.to_string(),
            expected: version,
            actual: Some(version),
            held: true,
        }
    }

    /// Creates an insufficient quantity error.
    pub fn insufficient_quantity(id: impl fmt::Display, available: u32, requested: u32) -> Self {
        Self::InsufficientQuantity {
            id: id.to_string(),
            available,
            requested,
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::InsufficientQuantity { .. } => ErrorKind::InsufficientQuantity,
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LockTimeout { key, waited } => Self::LockTimeout { id: key, waited },
            StorageError::InvalidField { field, reason } => Self::InvalidArgument {
                message: format!("{field}: {reason}"),
            },
            StorageError::DuplicateKey { key } => Self::InvalidArgument {
                message: format!("{key} already exists"),
            },
            StorageError::ForeignHold { held, target } => Self::InvalidArgument {
                message: format!("hold for {held} cannot write {target}"),
            },
            fault @ (StorageError::Unavailable { .. }
            | StorageError::Codec(_)
            | StorageError::Corrupted(_)) => Self::BackendUnavailable(fault),
        }
    }
}

/// Discriminant of [`CoreError`], for callers that branch on the failure
/// class rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Record absent.
    NotFound,
    /// Lost an optimistic race.
    VersionConflict,
    /// Guard rejected a decrease.
    InsufficientQuantity,
    /// Hold not granted in time.
    LockTimeout,
    /// Backend fault.
    BackendUnavailable,
    /// Input rejected.
    InvalidArgument,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::NotFound,
        Self::VersionConflict,
        Self::InsufficientQuantity,
        Self::LockTimeout,
        Self::BackendUnavailable,
        Self::InvalidArgument,
    ];

    /// Returns true if the caller must re-read current state before trying
    /// again.
    #[must_use]
    pub const fn requires_refetch(self) -> bool {
        matches!(self, Self::VersionConflict | Self::InsufficientQuantity)
    }

    /// Returns true if the same request may succeed later without any
    /// change on the caller's side.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::LockTimeout | Self::BackendUnavailable)
    }

    /// Returns true if re-running the whole operation can succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        self.requires_refetch() || self.is_transient()
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::VersionConflict => "version_conflict",
            Self::InsufficientQuantity => "insufficient_quantity",
            Self::LockTimeout => "lock_timeout",
            Self::BackendUnavailable => "backend_unavailable",
            Self::InvalidArgument => "invalid_argument",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
