//! Services binding a backend to a concurrency-controlled store.
//!
//! Each service owns one backend and exposes record lifecycle (create,
//! list, delete) together with every store operation, choosing the
//! concurrency strategy per call.

mod inventory;
mod product;

pub use inventory::InventoryService;
pub use product::ProductService;
