//! # StockLock Storage
//!
//! Versioned records and the storage backends that hold them.
//!
//! This crate provides the lowest layer of StockLock: the record model, the
//! [`StorageAdapter`] contract and two in-process engines implementing it.
//! The contract is deliberately small. A backend only has to offer a
//! version-checked write and an exclusive per-key hold; everything else is
//! built on top in `stocklock_core`.
//!
//! ## Available Backends
//!
//! - [`RelationalBackend`] - product rows with row locks and auto-increment ids
//! - [`DocumentBackend`] - inventory documents stored as CBOR with document locks
//!
//! ## Example
//!
//! ```rust
//! use stocklock_storage::{
//!     CasOutcome, NewProduct, RelationalBackend, StorageAdapter, VersionedRecord,
//! };
//!
//! let backend = RelationalBackend::new();
//! let mut product = backend.insert(NewProduct::new("Laptop", 999.0, 10)).unwrap();
//! product.set_quantity(9);
//!
//! let outcome = backend.save_if_version_matches(&product).unwrap();
//! assert!(matches!(outcome, CasOutcome::Committed(p) if p.version().as_u64() == 1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod document;
mod error;
mod lock;
mod record;
mod relational;

pub use adapter::{CasOutcome, ExclusiveHold, StorageAdapter};
pub use document::DocumentBackend;
pub use error::{StorageError, StorageResult};
pub use lock::{LockGuard, LockTable};
pub use record::{
    Inventory, InventoryId, InventoryPatch, NewInventory, NewProduct, Product, ProductId,
    ProductPatch, Version, VersionedRecord,
};
pub use relational::RelationalBackend;
