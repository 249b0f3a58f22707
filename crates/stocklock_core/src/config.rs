//! Store configuration.

use std::time::{Duration, Instant};

/// How long a pessimistic operation may wait for an exclusive hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockWait {
    /// Block until the hold is granted.
    #[default]
    Indefinite,
    /// Give up after the given duration, measured from the call.
    Timeout(Duration),
    /// Give up at a fixed point in time.
    Until(Instant),
}

impl LockWait {
    /// Resolves the wait into an absolute deadline relative to `now`.
    #[must_use]
    pub fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Self::Indefinite => None,
            Self::Timeout(timeout) => now.checked_add(timeout),
            Self::Until(deadline) => Some(deadline),
        }
    }
}

impl From<Option<Duration>> for LockWait {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map_or(Self::Indefinite, Self::Timeout)
    }
}

/// Configuration for a [`crate::ConcurrencyControlledStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Default wait for pessimistic operations. `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,

    /// Simulated work between reading a record and writing it back.
    ///
    /// Zero in production. Demos and tests raise it to widen the window in
    /// which concurrent callers can interleave.
    pub processing_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: None,
            processing_delay: Duration::ZERO,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default lock wait for pessimistic operations.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Makes pessimistic operations wait indefinitely by default.
    #[must_use]
    pub const fn wait_indefinitely(mut self) -> Self {
        self.lock_timeout = None;
        self
    }

    /// Sets the simulated processing delay.
    #[must_use]
    pub const fn processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    /// Returns the default lock wait derived from `lock_timeout`.
    #[must_use]
    pub fn lock_wait(&self) -> LockWait {
        LockWait::from(self.lock_timeout)
    }
}
