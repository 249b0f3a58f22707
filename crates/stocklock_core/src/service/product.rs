//! Product service over the relational backend.

use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::store::ConcurrencyControlledStore;
use crate::types::Strategy;
use std::sync::Arc;
use std::time::Instant;
use stocklock_storage::{
    NewProduct, Product, ProductId, ProductPatch, RelationalBackend, VersionedRecord,
};
use tracing::info;

/// Products stored as rows, guarded by version checks or row locks.
#[derive(Debug, Clone)]
pub struct ProductService {
    backend: Arc<RelationalBackend>,
    store: ConcurrencyControlledStore<RelationalBackend>,
}

impl Default for ProductService {
    fn default() -> Self {
        Self::new(Arc::new(RelationalBackend::new()))
    }
}

impl ProductService {
    /// Creates a service with the default store configuration.
    pub fn new(backend: Arc<RelationalBackend>) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    /// Creates a service with the given store configuration.
    pub fn with_config(backend: Arc<RelationalBackend>, config: StoreConfig) -> Self {
        let store = ConcurrencyControlledStore::with_config(Arc::clone(&backend), config);
        Self { backend, store }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &Arc<RelationalBackend> {
        &self.backend
    }

    /// Returns the store.
    pub fn store(&self) -> &ConcurrencyControlledStore<RelationalBackend> {
        &self.store
    }

    /// Creates a product with a fresh id at the initial version.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::InvalidArgument`] for a bad price, or
    /// [`crate::CoreError::BackendUnavailable`].
    pub fn create(&self, new: NewProduct) -> CoreResult<Product> {
        let product = self.backend.insert(new)?;
        info!(
            record_id = %product.id(),
            name = product.name(),
            stock = product.stock(),
            "product created"
        );
        Ok(product)
    }

    /// Returns the product with `id`.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::NotFound`] or [`crate::CoreError::BackendUnavailable`].
    pub fn get(&self, id: ProductId) -> CoreResult<Product> {
        self.store.get(&id)
    }

    /// Returns every product ordered by id.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::BackendUnavailable`].
    pub fn list(&self) -> CoreResult<Vec<Product>> {
        Ok(self.backend.list()?)
    }

    /// Deletes a product once no caller holds its row lock.
    ///
    /// Returns whether a product was removed.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::LockTimeout`] if the configured lock timeout
    /// passes first, or [`crate::CoreError::BackendUnavailable`].
    pub fn delete(&self, id: ProductId) -> CoreResult<bool> {
        let deadline = self.store.config().lock_wait().deadline(Instant::now());
        let removed = self.backend.delete(id, deadline)?;
        info!(record_id = %id, removed, "product delete");
        Ok(removed)
    }

    /// Applies `patch` with the given strategy.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::update_optimistic`] and
    /// [`ConcurrencyControlledStore::update_pessimistic`].
    pub fn update(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        strategy: Strategy,
    ) -> CoreResult<Product> {
        match strategy {
            Strategy::Optimistic => self.store.update_optimistic(&id, patch),
            Strategy::Pessimistic => self.store.update_pessimistic(&id, patch),
        }
    }

    /// Removes `amount` units of stock with the given strategy.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::decrease_quantity_optimistic`] and
    /// [`ConcurrencyControlledStore::decrease_quantity_pessimistic`].
    pub fn decrease_stock(
        &self,
        id: ProductId,
        amount: u32,
        strategy: Strategy,
    ) -> CoreResult<Product> {
        match strategy {
            Strategy::Optimistic => self.store.decrease_quantity_optimistic(&id, amount),
            Strategy::Pessimistic => self.store.decrease_quantity_pessimistic(&id, amount),
        }
    }

    /// Bumps the product version without changing its fields.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::force_increment`].
    pub fn force_increment(&self, id: ProductId) -> CoreResult<Product> {
        self.store.force_increment(&id)
    }

    /// Reads the product under its row lock, waiting as configured.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::read_exclusive`].
    pub fn read_locked(&self, id: ProductId) -> CoreResult<Product> {
        self.store.read_exclusive(&id, self.store.config().lock_wait())
    }
}
