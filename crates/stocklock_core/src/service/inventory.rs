//! Inventory service over the document backend.

use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::store::ConcurrencyControlledStore;
use crate::types::Strategy;
use std::sync::Arc;
use std::time::Instant;
use stocklock_storage::{
    DocumentBackend, Inventory, InventoryId, InventoryPatch, NewInventory, VersionedRecord,
};
use tracing::info;

/// Inventory items stored as documents, guarded by version checks or
/// document locks.
#[derive(Debug, Clone)]
pub struct InventoryService {
    backend: Arc<DocumentBackend>,
    store: ConcurrencyControlledStore<DocumentBackend>,
}

impl Default for InventoryService {
    fn default() -> Self {
        Self::new(Arc::new(DocumentBackend::new()))
    }
}

impl InventoryService {
    /// Creates a service with the default store configuration.
    pub fn new(backend: Arc<DocumentBackend>) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    /// Creates a service with the given store configuration.
    pub fn with_config(backend: Arc<DocumentBackend>, config: StoreConfig) -> Self {
        let store = ConcurrencyControlledStore::with_config(Arc::clone(&backend), config);
        Self { backend, store }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &Arc<DocumentBackend> {
        &self.backend
    }

    /// Returns the store.
    pub fn store(&self) -> &ConcurrencyControlledStore<DocumentBackend> {
        &self.store
    }

    /// Creates an item at the initial version. A random id is assigned
    /// unless one is given.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::InvalidArgument`] for a bad price or a taken id,
    /// or [`crate::CoreError::BackendUnavailable`].
    pub fn create(&self, new: NewInventory) -> CoreResult<Inventory> {
        let item = self.backend.insert(new)?;
        info!(
            record_id = %item.id(),
            item_name = item.item_name(),
            quantity = item.quantity(),
            "inventory item created"
        );
        Ok(item)
    }

    /// Returns the item with `id`.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::NotFound`] or [`crate::CoreError::BackendUnavailable`].
    pub fn get(&self, id: &InventoryId) -> CoreResult<Inventory> {
        self.store.get(id)
    }

    /// Returns every item ordered by id.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::BackendUnavailable`].
    pub fn list(&self) -> CoreResult<Vec<Inventory>> {
        Ok(self.backend.list()?)
    }

    /// Returns the first item (in id order) with the given name.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::BackendUnavailable`].
    pub fn find_by_item_name(&self, item_name: &str) -> CoreResult<Option<Inventory>> {
        Ok(self.backend.find_by_item_name(item_name)?)
    }

    /// Deletes an item once no caller holds its document lock.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::LockTimeout`] or [`crate::CoreError::BackendUnavailable`].
    pub fn delete(&self, id: &InventoryId) -> CoreResult<bool> {
        let deadline = self.store.config().lock_wait().deadline(Instant::now());
        let removed = self.backend.delete(id, deadline)?;
        info!(record_id = %id, removed, "inventory item delete");
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
        id: &InventoryId,
        patch: &InventoryPatch,
        strategy: Strategy,
    ) -> CoreResult<Inventory> {
        match strategy {
            Strategy::Optimistic => self.store.update_optimistic(id, patch),
            Strategy::Pessimistic => self.store.update_pessimistic(id, patch),
        }
    }

    /// Removes `amount` units with the given strategy.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::decrease_quantity_optimistic`] and
    /// [`ConcurrencyControlledStore::decrease_quantity_pessimistic`].
    pub fn decrease_quantity(
        &self,
        id: &InventoryId,
        amount: u32,
        strategy: Strategy,
    ) -> CoreResult<Inventory> {
        match strategy {
            Strategy::Optimistic => self.store.decrease_quantity_optimistic(id, amount),
            Strategy::Pessimistic => self.store.decrease_quantity_pessimistic(id, amount),
        }
    }

    /// Bumps the item version without changing its fields.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::force_increment`].
    pub fn force_increment(&self, id: &InventoryId) -> CoreResult<Inventory> {
        self.store.force_increment(id)
    }

    /// Reads the item under its document lock, waiting as configured.
    ///
    /// # Errors
    ///
    /// See [`ConcurrencyControlledStore::read_exclusive`].
    pub fn read_locked(&self, id: &InventoryId) -> CoreResult<Inventory> {
        self.store.read_exclusive(id, self.store.config().lock_wait())
    }
}
