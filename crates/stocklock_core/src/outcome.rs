//! Classification of backend signals into operation outcomes.
//!
//! Storage speaks in [`CasOutcome`] values and [`stocklock_storage::StorageError`]s.
//! The functions here turn those into the caller-facing [`CoreResult`], and
//! [`Outcome`] collapses a finished result into the terminal state of the
//! operation.

use crate::error::{CoreError, CoreResult, ErrorKind};
use std::fmt;
use stocklock_storage::{CasOutcome, VersionedRecord};

/// Terminal state of a single store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    /// The write committed.
    Success,
    /// An optimistic write lost its race.
    VersionConflict,
    /// The quantity guard rejected the request.
    InsufficientQuantity,
    /// The record does not exist.
    NotFound,
    /// Any other failure: timeout, backend fault or rejected input.
    Failed(ErrorKind),
}

impl Outcome {
    /// Classifies a finished operation.
    pub fn of<T>(result: &CoreResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => Self::from_kind(err.kind()),
        }
    }

    /// Maps an error kind onto its outcome.
    #[must_use]
    pub const fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::VersionConflict => Self::VersionConflict,
            ErrorKind::InsufficientQuantity => Self::InsufficientQuantity,
            ErrorKind::NotFound => Self::NotFound,
            other => Self::Failed(other),
        }
    }

    /// Every failure outcome, one per error kind.
    pub fn failures() -> impl Iterator<Item = Self> {
        ErrorKind::ALL.into_iter().map(Self::from_kind)
    }

    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::VersionConflict => "version_conflict",
            Self::InsufficientQuantity => "insufficient_quantity",
            Self::NotFound => "not_found",
            Self::Failed(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a lookup result into its value or [`CoreError::NotFound`].
pub(crate) fn require<T>(id: &impl fmt::Display, found: Option<T>) -> CoreResult<T> {
    found.ok_or_else(|| CoreError::not_found(id))
}

/// Turns a compare-and-swap outcome into the committed record or
/// [`CoreError::VersionConflict`].
pub(crate) fn classify_cas<R: VersionedRecord>(
    id: &R::Id,
    outcome: CasOutcome<R>,
) -> CoreResult<R> {
    match outcome {
        CasOutcome::Committed(record) => Ok(record),
        CasOutcome::Conflict { expected, actual } => {
            Err(CoreError::version_conflict(id, expected, actual))
        }
        CasOutcome::Held { version } => Err(CoreError::held_conflict(id, version)),
    }
}

/// Applies the quantity guard to `record` and removes `amount` from it.
pub(crate) fn take_quantity<R: VersionedRecord>(record: &mut R, amount: u32) -> CoreResult<()> {
    let available = record.quantity();
    match available.checked_sub(amount) {
        Some(remaining) => {
            record.set_quantity(remaining);
            Ok(())
        }
        None => Err(CoreError::insufficient_quantity(
            record.id(),
            available,
            amount,
        )),
    }
}
