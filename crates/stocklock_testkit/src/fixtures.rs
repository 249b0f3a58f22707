//! Test fixtures and service helpers.
//!
//! Provides seeded services on both backends so tests can start from a
//! single known record.

use std::sync::Arc;
use std::time::Duration;
use stocklock_core::{InventoryService, ProductService, StoreConfig};
use stocklock_storage::{
    DocumentBackend, InventoryId, NewInventory, NewProduct, ProductId, RelationalBackend,
    VersionedRecord,
};

/// Store configuration that widens the read-to-write window so concurrent
/// callers reliably interleave.
#[must_use]
pub fn racing_config(delay: Duration) -> StoreConfig {
    StoreConfig::new().processing_delay(delay)
}

/// A product service holding one seeded product.
#[derive(Debug, Clone)]
pub struct SeededProduct {
    /// The service.
    pub service: ProductService,
    /// Id of the seeded product.
    pub id: ProductId,
}

impl SeededProduct {
    /// Seeds a product with `stock` units and the default configuration.
    pub fn new(stock: u32) -> Self {
        Self::with_config(stock, StoreConfig::default())
    }

    /// Seeds a product with `stock` units.
    pub fn with_config(stock: u32, config: StoreConfig) -> Self {
        let service = ProductService::with_config(Arc::new(RelationalBackend::new()), config);
        let id = *service
            .create(NewProduct::new("Laptop", 999.0, stock).description("15 inch"))
            .expect("Failed to seed product")
            .id();
        Self { service, id }
    }
}

/// An inventory service holding one seeded item.
#[derive(Debug, Clone)]
pub struct SeededInventory {
    /// The service.
    pub service: InventoryService,
    /// Id of the seeded item.
    pub id: InventoryId,
}

impl SeededInventory {
    /// Seeds an item with `quantity` units and the default configuration.
    pub fn new(quantity: u32) -> Self {
        Self::with_config(quantity, StoreConfig::default())
    }

    /// Seeds an item with `quantity` units.
    pub fn with_config(quantity: u32, config: StoreConfig) -> Self {
        let service = InventoryService::with_config(Arc::new(DocumentBackend::new()), config);
        let id = service
            .create(
                NewInventory::new("Widget", 2.5, quantity)
                    .with_id(InventoryId::new("widget-001"))
                    .category("parts"),
            )
            .expect("Failed to seed inventory item")
            .id()
            .clone();
        Self { service, id }
    }
}

/// Runs a test against a freshly seeded product.
///
/// # Example
///
/// ```rust
/// use stocklock_core::Strategy;
/// use stocklock_testkit::with_product;
///
/// with_product(3, |service, id| {
///     let product = service.decrease_stock(id, 1, Strategy::Optimistic).unwrap();
///     assert_eq!(product.stock(), 2);
/// });
/// ```
pub fn with_product<F, R>(stock: u32, f: F) -> R
where
    F: FnOnce(&ProductService, ProductId) -> R,
{
    let seeded = SeededProduct::new(stock);
    f(&seeded.service, seeded.id)
}

/// Runs a test against a freshly seeded inventory item.
pub fn with_inventory<F, R>(quantity: u32, f: F) -> R
where
    F: FnOnce(&InventoryService, &InventoryId) -> R,
{
    let seeded = SeededInventory::new(quantity);
    f(&seeded.service, &seeded.id)
}
