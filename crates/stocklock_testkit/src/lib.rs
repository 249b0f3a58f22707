//! # StockLock Testkit
//!
//! Test utilities for StockLock.
//!
//! This crate provides:
//! - Seeded product and inventory fixtures
//! - Property-based test generators and a sequential reference model
//! - Multi-threaded stress drivers for both strategies
//!
//! ## Usage
//!
//! ```rust
//! use stocklock_core::Strategy;
//! use stocklock_testkit::prelude::*;
//!
//! let report = stress_products(&StressConfig {
//!     threads: 2,
//!     ops_per_thread: 3,
//!     strategy: Strategy::Pessimistic,
//!     ..Default::default()
//! });
//! assert_eq!(report.successful_ops, 6);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
