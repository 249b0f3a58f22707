//! Storage adapter contract.

use crate::error::StorageResult;
use crate::lock::LockGuard;
use crate::record::{Version, VersionedRecord};
use std::time::{Duration, Instant};

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome<R> {
    /// The stored version matched and the write was applied. Carries the
    /// record as stored, with its new version.
    Committed(R),
    /// The stored version moved on, or the record was deleted. Nothing was
    /// written.
    Conflict {
        /// Version the caller read.
        expected: Version,
        /// Version currently stored, `None` if the record no longer exists.
        actual: Option<Version>,
    },
    /// The record is being written under an exclusive hold. Nothing was
    /// written.
    Held {
        /// Version stored when the write was refused.
        version: Version,
    },
}

impl<R> CasOutcome<R> {
    /// Returns true if the write was applied.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// An exclusive hold on a record together with the state read under it.
///
/// The hold lasts until the value is passed to
/// [`StorageAdapter::save_unconditionally`] (commit) or
/// [`StorageAdapter::release_exclusive`] (abort), or is dropped.
#[derive(Debug)]
pub struct ExclusiveHold<R: VersionedRecord> {
    record: R,
    guard: LockGuard<R::Id>,
}

impl<R: VersionedRecord> ExclusiveHold<R> {
    pub(crate) fn new(record: R, guard: LockGuard<R::Id>) -> Self {
        Self { record, guard }
    }

    /// Returns the record as read under the hold.
    #[must_use]
    pub fn record(&self) -> &R {
        &self.record
    }

    /// Returns the held identifier.
    #[must_use]
    pub fn id(&self) -> &R::Id {
        self.guard.key()
    }

    /// Returns how long the hold has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.guard.held_for()
    }

    pub(crate) fn guard(&self) -> &LockGuard<R::Id> {
        &self.guard
    }
}

/// The two concurrency primitives a storage engine must provide.
///
/// # Invariants
///
/// - Every committed write bumps the record version by exactly one.
/// - `save_if_version_matches` writes nothing unless the stored version
///   equals the version of the record passed in, and never blocks.
/// - While an [`ExclusiveHold`] exists for an id, no other write to that id
///   can commit.
/// - Implementations must be `Send + Sync`; callers share them across
///   threads.
pub trait StorageAdapter: Send + Sync {
    /// The record type this backend stores.
    type Record: VersionedRecord;

    /// Short backend name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Reads the latest committed state without locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or data is unreadable.
    fn get(
        &self,
        id: &<Self::Record as VersionedRecord>::Id,
    ) -> StorageResult<Option<Self::Record>>;

    /// Writes `record` if the stored version still equals `record.version()`.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend faults; a lost race is reported as
    /// [`CasOutcome::Conflict`].
    fn save_if_version_matches(
        &self,
        record: &Self::Record,
    ) -> StorageResult<CasOutcome<Self::Record>>;

    /// Acquires the exclusive hold on `id` and reads the record under it.
    ///
    /// Returns `Ok(None)` (with the hold already released) if the record
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::LockTimeout`] if `deadline` passes
    /// before the hold is granted, or a backend fault.
    fn get_exclusive(
        &self,
        id: &<Self::Record as VersionedRecord>::Id,
        deadline: Option<Instant>,
    ) -> StorageResult<Option<ExclusiveHold<Self::Record>>>;

    /// Writes `record` under `hold`, bumps its version and releases the hold.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ForeignHold`] if the hold was not issued
    /// by this backend for `record`'s id. The hold is released in every case.
    fn save_unconditionally(
        &self,
        hold: ExclusiveHold<Self::Record>,
        record: Self::Record,
    ) -> StorageResult<Self::Record>;

    /// Releases `hold` without writing.
    fn release_exclusive(&self, hold: ExclusiveHold<Self::Record>) {
        drop(hold);
    }
}
