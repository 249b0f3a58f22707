//! The concurrency-controlled store.
//!
//! [`ConcurrencyControlledStore`] runs every mutation under one of two
//! strategies:
//!
//! - **Optimistic**: read, mutate a private copy, then write back with a
//!   version check. A lost race is reported as
//!   [`CoreError::VersionConflict`] and is never retried here.
//! - **Pessimistic**: take the exclusive hold, read under it, mutate, write
//!   back unconditionally and release. Callers on the same record are
//!   serialized and cannot conflict.
//!
//! Quantity guards are always evaluated against the state read by the
//! current attempt. For the pessimistic strategy that is the state read
//! under the hold.

use crate::config::{LockWait, StoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::outcome::{classify_cas, require, take_quantity};
use crate::types::Strategy;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use stocklock_storage::{StorageAdapter, VersionedRecord};
use tracing::{debug, info, warn};

/// Record type stored by adapter `A`.
pub type RecordOf<A> = <A as StorageAdapter>::Record;
/// Identifier type of the records stored by adapter `A`.
pub type IdOf<A> = <RecordOf<A> as VersionedRecord>::Id;
/// Patch type accepted by the records stored by adapter `A`.
pub type PatchOf<A> = <RecordOf<A> as VersionedRecord>::Patch;

/// Orchestrates optimistic and pessimistic writes over a storage adapter.
///
/// The store is stateless apart from its configuration. It can be shared
/// across threads and holds no lock between calls.
#[derive(Debug)]
pub struct ConcurrencyControlledStore<A: StorageAdapter> {
    adapter: Arc<A>,
    config: StoreConfig,
}

impl<A: StorageAdapter> Clone for ConcurrencyControlledStore<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
        }
    }
}

impl<A: StorageAdapter> ConcurrencyControlledStore<A> {
    /// Creates a store with the default configuration.
    pub fn new(adapter: Arc<A>) -> Self {
        Self::with_config(adapter, StoreConfig::default())
    }

    /// Creates a store with the given configuration.
    pub fn with_config(adapter: Arc<A>, config: StoreConfig) -> Self {
        Self { adapter, config }
    }

    /// Returns the underlying adapter.
    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Reads the latest committed state of `id`.
    ///
    /// Not synchronized with exclusive holds. Use
    /// [`ConcurrencyControlledStore::read_exclusive`] for that.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the record is absent, or
    /// [`CoreError::BackendUnavailable`] on a backend fault.
    pub fn get(&self, id: &IdOf<A>) -> CoreResult<RecordOf<A>> {
        let found = self.adapter.get(id)?;
        debug!(
            backend = self.adapter.name(),
            record_id = %id,
            found = found.is_some(),
            "read"
        );
        require(id, found)
    }

    /// Applies `patch` with a version-checked write.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`], [`CoreError::InvalidArgument`] for a patch
    /// the model rejects, [`CoreError::VersionConflict`] if another writer
    /// committed first, or [`CoreError::BackendUnavailable`].
    pub fn update_optimistic(
        &self,
        id: &IdOf<A>,
        patch: &PatchOf<A>,
    ) -> CoreResult<RecordOf<A>> {
        self.optimistic(id, "update", |record| {
            record.apply_patch(patch).map_err(CoreError::from)
        })
    }

    /// Applies `patch` under the exclusive hold, waiting as configured.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`], [`CoreError::InvalidArgument`],
    /// [`CoreError::LockTimeout`] or [`CoreError::BackendUnavailable`].
    pub fn update_pessimistic(
        &self,
        id: &IdOf<A>,
        patch: &PatchOf<A>,
    ) -> CoreResult<RecordOf<A>> {
        self.update_pessimistic_with(id, patch, self.config.lock_wait())
    }

    /// Applies `patch` under the exclusive hold with an explicit wait.
    ///
    /// # Errors
    ///
    /// Same as [`ConcurrencyControlledStore::update_pessimistic`].
    pub fn update_pessimistic_with(
        &self,
        id: &IdOf<A>,
        patch: &PatchOf<A>,
        wait: LockWait,
    ) -> CoreResult<RecordOf<A>> {
        self.pessimistic(id, wait, "update", |record| {
            record.apply_patch(patch).map_err(CoreError::from)
        })
    }

    /// Removes `amount` from the record's quantity with a version-checked
    /// write.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidArgument`] if `amount` is zero,
    /// [`CoreError::InsufficientQuantity`] if the state read holds less than
    /// `amount`, [`CoreError::VersionConflict`] if another writer committed
    /// first, [`CoreError::NotFound`] or [`CoreError::BackendUnavailable`].
    pub fn decrease_quantity_optimistic(
        &self,
        id: &IdOf<A>,
        amount: u32,
    ) -> CoreResult<RecordOf<A>> {
        check_amount(amount)?;
        self.optimistic(id, "decrease", |record| take_quantity(record, amount))
    }

    /// Removes `amount` from the record's quantity under the exclusive
    /// hold, waiting as configured.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidArgument`] if `amount` is zero,
    /// [`CoreError::InsufficientQuantity`] if the state read under the hold
    /// holds less than `amount`, [`CoreError::LockTimeout`],
    /// [`CoreError::NotFound`] or [`CoreError::BackendUnavailable`].
    pub fn decrease_quantity_pessimistic(
        &self,
        id: &IdOf<A>,
        amount: u32,
    ) -> CoreResult<RecordOf<A>> {
        self.decrease_quantity_pessimistic_with(id, amount, self.config.lock_wait())
    }

    /// Pessimistic decrease with an explicit wait.
    ///
    /// # Errors
    ///
    /// Same as [`ConcurrencyControlledStore::decrease_quantity_pessimistic`].
    pub fn decrease_quantity_pessimistic_with(
        &self,
        id: &IdOf<A>,
        amount: u32,
        wait: LockWait,
    ) -> CoreResult<RecordOf<A>> {
        check_amount(amount)?;
        self.pessimistic(id, wait, "decrease", |record| {
            take_quantity(record, amount)
        })
    }

    /// Bumps the version of `id` without changing any field.
    ///
    /// Marks the record as modified so that every optimistic writer holding
    /// an older copy will conflict.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`], [`CoreError::VersionConflict`] or
    /// [`CoreError::BackendUnavailable`].
    pub fn force_increment(&self, id: &IdOf<A>) -> CoreResult<RecordOf<A>> {
        self.optimistic(id, "force_increment", |_| Ok(()))
    }

    /// Reads `id` under the exclusive hold and releases it again.
    ///
    /// The returned state is never one a pessimistic writer is halfway
    /// through producing.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`], [`CoreError::LockTimeout`] or
    /// [`CoreError::BackendUnavailable`].
    pub fn read_exclusive(&self, id: &IdOf<A>, wait: LockWait) -> CoreResult<RecordOf<A>> {
        let started = Instant::now();
        let hold = self
            .adapter
            .get_exclusive(id, wait.deadline(started))
            .map_err(|err| self.lock_failure(id, "read_exclusive", err))?;
        let hold = require(id, hold)?;
        let record = hold.record().clone();
        self.adapter.release_exclusive(hold);
        debug!(
            backend = self.adapter.name(),
            record_id = %id,
            version = %record.version(),
            waited_ms = started.elapsed().as_millis() as u64,
            "read under exclusive hold"
        );
        Ok(record)
    }

    fn optimistic<F>(&self, id: &IdOf<A>, op: &'static str, mutate: F) -> CoreResult<RecordOf<A>>
    where
        F: FnOnce(&mut RecordOf<A>) -> CoreResult<()>,
    {
        let strategy = Strategy::Optimistic;
        let mut record = self.get(id)?;
        let read_version = record.version();

        if let Err(err) = mutate(&mut record) {
            warn!(
                backend = self.adapter.name(),
                record_id = %id,
                %strategy,
                op,
                version = %read_version,
                error = %err,
                "rejected before write"
            );
            return Err(err);
        }
        self.simulate_processing();

        let outcome = self.adapter.save_if_version_matches(&record)?;
        match classify_cas(id, outcome) {
            Ok(saved) => {
                info!(
                    backend = self.adapter.name(),
                    record_id = %id,
                    %strategy,
                    op,
                    version = %saved.version(),
                    "committed"
                );
                Ok(saved)
            }
            Err(err) => {
                warn!(
                    backend = self.adapter.name(),
                    record_id = %id,
                    %strategy,
                    op,
                    read_version = %read_version,
                    error = %err,
                    "conflict"
                );
                Err(err)
            }
        }
    }

    fn pessimistic<F>(
        &self,
        id: &IdOf<A>,
        wait: LockWait,
        op: &'static str,
        mutate: F,
    ) -> CoreResult<RecordOf<A>>
    where
        F: FnOnce(&mut RecordOf<A>) -> CoreResult<()>,
    {
        let strategy = Strategy::Pessimistic;
        let started = Instant::now();
        let hold = self
            .adapter
            .get_exclusive(id, wait.deadline(started))
            .map_err(|err| self.lock_failure(id, op, err))?;
        let hold = require(id, hold)?;
        debug!(
            backend = self.adapter.name(),
            record_id = %id,
            %strategy,
            op,
            version = %hold.record().version(),
            waited_ms = started.elapsed().as_millis() as u64,
            "exclusive hold granted"
        );

        let mut record = hold.record().clone();
        if let Err(err) = mutate(&mut record) {
            self.adapter.release_exclusive(hold);
            warn!(
                backend = self.adapter.name(),
                record_id = %id,
                %strategy,
                op,
                version = %record.version(),
                error = %err,
                "rejected under exclusive hold"
            );
            return Err(err);
        }
        self.simulate_processing();

        let saved = self.adapter.save_unconditionally(hold, record)?;
        info!(
            backend = self.adapter.name(),
            record_id = %id,
            %strategy,
            op,
            version = %saved.version(),
            "committed"
        );
        Ok(saved)
    }

    fn lock_failure(
        &self,
        id: &IdOf<A>,
        op: &'static str,
        err: stocklock_storage::StorageError,
    ) -> CoreError {
        let err = CoreError::from(err);
        warn!(
            backend = self.adapter.name(),
            record_id = %id,
            op,
            error = %err,
            "exclusive hold not granted"
        );
        err
    }

    fn simulate_processing(&self) {
        if !self.config.processing_delay.is_zero() {
            thread::sleep(self.config.processing_delay);
        }
    }
}

fn check_amount(amount: u32) -> CoreResult<()> {
    if amount == 0 {
        return Err(CoreError::invalid_argument(
            "decrease amount must be greater than zero",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Barrier;
    use std::time::Duration;
    use stocklock_storage::{
        DocumentBackend, InventoryId, InventoryPatch, NewInventory, NewProduct, ProductId,
        ProductPatch, RelationalBackend, Version,
    };

    fn product_store(stock: u32) -> (ConcurrencyControlledStore<RelationalBackend>, ProductId) {
        let backend = Arc::new(RelationalBackend::new());
        let product = backend
            .insert(NewProduct::new("Keyboard", 49.5, stock))
            .unwrap();
        (ConcurrencyControlledStore::new(backend), *product.id())
    }

    fn inventory_store(
        quantity: u32,
    ) -> (ConcurrencyControlledStore<DocumentBackend>, InventoryId) {
        let backend = Arc::new(DocumentBackend::new());
        let item = backend
            .insert(NewInventory::new("Widget", 3.0, quantity).category("parts"))
            .unwrap();
        (ConcurrencyControlledStore::new(backend), item.id().clone())
    }

    #[test]
    fn get_missing_is_not_found() {
        let (store, _) = product_store(1);
        let err = store.get(&ProductId(404)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn repeated_get_is_idempotent() {
        let (store, id) = product_store(5);
        let first = store.get(&id).unwrap();
        let second = store.get(&id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn optimistic_update_bumps_version() {
        let (store, id) = product_store(5);
        let saved = store
            .update_optimistic(&id, &ProductPatch::new().name("Mechanical keyboard").price(79.0))
            .unwrap();

        assert_eq!(saved.version(), Version::new(1));
        assert_eq!(saved.name(), "Mechanical keyboard");
        assert_eq!(store.get(&id).unwrap(), saved);
    }

    #[test]
    fn optimistic_update_of_missing_record_writes_nothing() {
        let (store, _) = product_store(5);
        let err = store
            .update_optimistic(&ProductId(99), &ProductPatch::new().stock(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.adapter().len(), 1);
    }

    #[test]
    fn exclusive_paths_on_missing_record_are_not_found() {
        let (store, _) = inventory_store(5);
        let missing = InventoryId::new("missing");

        let err = store
            .update_pessimistic(&missing, &InventoryPatch::new().quantity(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.decrease_quantity_pessimistic(&missing, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.read_exclusive(&missing, LockWait::Indefinite).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(!store.adapter().is_locked(&missing));
        assert_eq!(store.adapter().len(), 1);
    }

    #[test]
    fn invalid_patch_is_rejected_without_write() {
        let (store, id) = product_store(5);
        let err = store
            .update_optimistic(&id, &ProductPatch::new().price(-1.0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.get(&id).unwrap().version(), Version::INITIAL);

        let err = store
            .update_pessimistic(&id, &ProductPatch::new().price(f64::NAN))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!store.adapter().is_locked(id));
        assert_eq!(store.get(&id).unwrap().version(), Version::INITIAL);
    }

    #[test]
    fn stale_optimistic_write_conflicts() {
        let (store, id) = product_store(5);
        let stale = store.get(&id).unwrap();
        store.force_increment(&id).unwrap();

        let outcome = store.adapter().save_if_version_matches(&stale).unwrap();
        let err = classify_cas(&id, outcome).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionConflict);
    }

    #[test]
    fn force_increment_changes_only_version() {
        let (store, id) = inventory_store(4);
        let before = store.get(&id).unwrap();
        let after = store.force_increment(&id).unwrap();

        assert_eq!(after.version(), before.version().next());
        assert_eq!(after.quantity(), before.quantity());
        assert_eq!(after.item_name(), before.item_name());
    }

    #[test]
    fn pessimistic_update_bumps_version_and_releases() {
        let (store, id) = inventory_store(4);
        let saved = store
            .update_pessimistic(&id, &InventoryPatch::new().quantity(40).category("bulk"))
            .unwrap();

        assert_eq!(saved.version(), Version::new(1));
        assert_eq!(saved.quantity(), 40);
        assert_eq!(saved.category(), "bulk");
        assert!(!store.adapter().is_locked(&id));
    }

    #[test]
    fn zero_decrease_is_invalid() {
        let (store, id) = product_store(5);
        for result in [
            store.decrease_quantity_optimistic(&id, 0),
            store.decrease_quantity_pessimistic(&id, 0),
        ] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn overdraw_leaves_quantity_unchanged() {
        let (store, id) = product_store(2);
        let err = store.decrease_quantity_optimistic(&id, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientQuantity);

        let err = store.decrease_quantity_pessimistic(&id, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientQuantity);
        assert!(!store.adapter().is_locked(id));

        let product = store.get(&id).unwrap();
        assert_eq!(product.stock(), 2);
        assert_eq!(product.version(), Version::INITIAL);
    }

    #[test]
    fn decreases_commit_on_both_strategies() {
        let (store, id) = inventory_store(10);
        let after = store.decrease_quantity_optimistic(&id, 4).unwrap();
        assert_eq!(after.quantity(), 6);
        let after = store.decrease_quantity_pessimistic(&id, 6).unwrap();
        assert_eq!(after.quantity(), 0);
        assert_eq!(after.version(), Version::new(2));
    }

    #[test]
    fn pessimistic_times_out_behind_holder() {
        let (store, id) = product_store(5);
        let hold = store.adapter().get_exclusive(&id, None).unwrap().unwrap();

        let started = Instant::now();
        let err = store
            .decrease_quantity_pessimistic_with(
                &id,
                1,
                LockWait::Timeout(Duration::from_millis(50)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        assert!(started.elapsed() >= Duration::from_millis(50));

        store.adapter().release_exclusive(hold);
        assert_eq!(store.get(&id).unwrap().stock(), 5);
    }

    #[test]
    fn configured_timeout_applies_by_default() {
        let backend = Arc::new(RelationalBackend::new());
        let id = *backend.insert(NewProduct::new("Cable", 5.0, 1)).unwrap().id();
        let store = ConcurrencyControlledStore::with_config(
            Arc::clone(&backend),
            StoreConfig::new().lock_timeout(Duration::from_millis(20)),
        );

        let _hold = backend.get_exclusive(&id, None).unwrap().unwrap();
        let err = store
            .update_pessimistic(&id, &ProductPatch::new().stock(9))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        let err = store.read_exclusive(&id, store.config().lock_wait()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
    }

    #[test]
    fn read_exclusive_waits_for_writer() {
        let (store, id) = product_store(8);
        let barrier = Arc::new(Barrier::new(2));

        let writer = {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let hold = store.adapter().get_exclusive(&id, None).unwrap().unwrap();
                barrier.wait();
                thread::sleep(Duration::from_millis(50));
                let mut record = hold.record().clone();
                record.set_quantity(7);
                store.adapter().save_unconditionally(hold, record).unwrap();
            })
        };

        barrier.wait();
        let seen = store.read_exclusive(&id, LockWait::Indefinite).unwrap();
        writer.join().unwrap();

        assert_eq!(seen.stock(), 7);
        assert_eq!(seen.version(), Version::new(1));
    }

    #[test]
    fn offline_backend_is_unavailable_not_conflict() {
        let (store, id) = inventory_store(3);
        store.adapter().set_online(false);

        for result in [
            store.get(&id).map(|_| ()),
            store.decrease_quantity_optimistic(&id, 1).map(|_| ()),
            store.decrease_quantity_pessimistic(&id, 1).map(|_| ()),
            store.force_increment(&id).map(|_| ()),
        ] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::BackendUnavailable);
        }

        store.adapter().set_online(true);
        assert_eq!(store.get(&id).unwrap().quantity(), 3);
    }
}
