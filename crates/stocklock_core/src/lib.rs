//! # StockLock Core
//!
//! Concurrency control for quantity-bearing records.
//!
//! This crate provides:
//! - [`ConcurrencyControlledStore`] with optimistic (version-checked) and
//!   pessimistic (exclusive hold) update and decrease operations
//! - Outcome classification from backend signals into [`CoreError`]
//! - An error taxonomy ([`ErrorKind`]) for callers to branch on
//! - [`retry_with_policy`], an opt-in caller-side retry helper
//! - [`ProductService`] and [`InventoryService`] wiring the two backends
//!
//! ## Example
//!
//! ```rust
//! use stocklock_core::{ErrorKind, ProductService, Strategy};
//! use stocklock_storage::{NewProduct, VersionedRecord};
//!
//! let service = ProductService::default();
//! let id = *service.create(NewProduct::new("Laptop", 999.0, 1)).unwrap().id();
//!
//! service.decrease_stock(id, 1, Strategy::Pessimistic).unwrap();
//! let err = service.decrease_stock(id, 1, Strategy::Optimistic).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::InsufficientQuantity);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod outcome;
mod retry;
mod service;
mod store;
mod types;

pub use config::{LockWait, StoreConfig};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use outcome::Outcome;
pub use retry::{retry_with_policy, RetryPolicy};
pub use service::{InventoryService, ProductService};
pub use store::{ConcurrencyControlledStore, IdOf, PatchOf, RecordOf};
pub use types::Strategy;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
