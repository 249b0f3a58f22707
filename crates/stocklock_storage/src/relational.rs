//! Relational-style backend for products.
//!
//! Rows live in an ordered table keyed by an auto-increment id. An
//! exclusive hold plays the role of a `SELECT ... FOR UPDATE` row lock and
//! the CAS write plays the role of
//! `UPDATE ... SET version = version + 1 WHERE id = ? AND version = ?`.

use crate::adapter::{CasOutcome, ExclusiveHold, StorageAdapter};
use crate::error::{StorageError, StorageResult};
use crate::lock::LockTable;
use crate::record::{validate_price, NewProduct, Product, ProductId, Version};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const NAME: &str = "relational";

/// In-process product table with row-level exclusive holds.
///
/// # Thread Safety
///
/// The table latch is only held for the duration of a single read or
/// write; callers waiting for a row lock never hold it.
#[derive(Debug)]
pub struct RelationalBackend {
    rows: RwLock<BTreeMap<ProductId, Product>>,
    next_id: AtomicU64,
    row_locks: Arc<LockTable<ProductId>>,
    online: AtomicBool,
}

impl Default for RelationalBackend {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            row_locks: Arc::new(LockTable::new()),
            online: AtomicBool::new(true),
        }
    }
}

impl RelationalBackend {
    /// Creates an empty product table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new row, assigning it the next id and the initial version.
    ///
    /// # Errors
    ///
    /// Returns an error if the price is invalid or the backend is offline.
    pub fn insert(&self, new: NewProduct) -> StorageResult<Product> {
        self.ensure_online()?;
        let price = validate_price(new.price)?;
        let id = ProductId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let product = Product {
            id,
            name: new.name,
            description: new.description,
            price,
            stock: new.stock,
            version: Version::INITIAL,
        };
        self.rows.write().insert(id, product.clone());
        debug!(record_id = %id, "row inserted");
        Ok(product)
    }

    /// Returns every row ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is offline.
    pub fn list(&self) -> StorageResult<Vec<Product>> {
        self.ensure_online()?;
        Ok(self.rows.read().values().cloned().collect())
    }

    /// Deletes a row, waiting for any exclusive hold on it to be released.
    ///
    /// Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockTimeout`] if the row stays locked past
    /// `deadline`, or an error if the backend is offline.
    pub fn delete(&self, id: ProductId, deadline: Option<Instant>) -> StorageResult<bool> {
        self.ensure_online()?;
        let _row_lock = self.row_locks.acquire(&id, deadline)?;
        let removed = self.rows.write().remove(&id).is_some();
        debug!(record_id = %id, removed, "row delete");
        Ok(removed)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Returns true if some caller holds the row lock on `id`.
    #[must_use]
    pub fn is_locked(&self, id: ProductId) -> bool {
        self.row_locks.is_held(&id)
    }

    /// Simulates losing or regaining the connection to the backend.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true unless the backend was taken offline.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StorageError::Unavailable { backend: NAME })
        }
    }
}

impl StorageAdapter for RelationalBackend {
    type Record = Product;

    fn name(&self) -> &'static str {
        NAME
    }

    fn get(&self, id: &ProductId) -> StorageResult<Option<Product>> {
        self.ensure_online()?;
        Ok(self.rows.read().get(id).cloned())
    }

    fn save_if_version_matches(&self, record: &Product) -> StorageResult<CasOutcome<Product>> {
        self.ensure_online()?;
        let expected = record.version;
        let mut rows = self.rows.write();

        let Some(stored) = rows.get_mut(&record.id) else {
            return Ok(CasOutcome::Conflict {
                expected,
                actual: None,
            });
        };

        // A locked row is being rewritten by a pessimistic writer. Its
        // version is about to move, so fail fast instead of waiting.
        if self.row_locks.is_held(&record.id) {
            debug!(record_id = %record.id, version = %stored.version, "row is held");
            return Ok(CasOutcome::Held {
                version: stored.version,
            });
        }
        if stored.version != expected {
            debug!(
                record_id = %record.id,
                %expected,
                actual = %stored.version,
                "version check failed"
            );
            return Ok(CasOutcome::Conflict {
                expected,
                actual: Some(stored.version),
            });
        }

        let mut committed = record.clone();
        committed.version = expected.next();
        *stored = committed.clone();
        Ok(CasOutcome::Committed(committed))
    }

    fn get_exclusive(
        &self,
        id: &ProductId,
        deadline: Option<Instant>,
    ) -> StorageResult<Option<ExclusiveHold<Product>>> {
        self.ensure_online()?;
        let guard = self.row_locks.acquire(id, deadline)?;
        self.ensure_online()?;
        let row = self.rows.read().get(id).cloned();
        Ok(row.map(|product| ExclusiveHold::new(product, guard)))
    }

    fn save_unconditionally(
        &self,
        hold: ExclusiveHold<Product>,
        record: Product,
    ) -> StorageResult<Product> {
        if !hold.guard().is_from(&self.row_locks) || *hold.id() != record.id {
            return Err(StorageError::ForeignHold {
                held: hold.id().to_string(),
                target: record.id.to_string(),
            });
        }
        self.ensure_online()?;

        let mut rows = self.rows.write();
        let Some(stored) = rows.get_mut(&record.id) else {
            return Err(StorageError::Corrupted(format!(
                "{} vanished while locked",
                record.id
            )));
        };

        let mut committed = record;
        committed.version = stored.version.next();
        *stored = committed.clone();
        drop(rows);
        drop(hold);
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VersionedRecord;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn backend_with_laptop() -> (RelationalBackend, Product) {
        let backend = RelationalBackend::new();
        let product = backend
            .insert(NewProduct::new("Laptop", 999.0, 10).description("14 inch"))
            .unwrap();
        (backend, product)
    }

    #[test]
    fn insert_assigns_sequential_ids_and_initial_version() {
        let backend = RelationalBackend::new();
        let a = backend.insert(NewProduct::new("A", 1.0, 1)).unwrap();
        let b = backend.insert(NewProduct::new("B", 2.0, 2)).unwrap();
        assert_eq!(a.id().as_u64(), 1);
        assert_eq!(b.id().as_u64(), 2);
        assert_eq!(a.version(), Version::INITIAL);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn insert_rejects_negative_price() {
        let backend = RelationalBackend::new();
        let err = backend.insert(NewProduct::new("A", -5.0, 1)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidField { .. }));
        assert!(backend.is_empty());
    }

    #[test]
    fn get_missing_returns_none() {
        let backend = RelationalBackend::new();
        assert!(backend.get(&ProductId::new(99)).unwrap().is_none());
    }

    #[test]
    fn cas_commits_and_bumps_version() {
        let (backend, mut product) = backend_with_laptop();
        product.set_quantity(9);

        let CasOutcome::Committed(saved) = backend.save_if_version_matches(&product).unwrap()
        else {
            panic!("expected commit");
        };
        assert_eq!(saved.version(), Version::new(1));
        assert_eq!(backend.get(product.id()).unwrap().unwrap(), saved);
    }

    #[test]
    fn cas_with_stale_version_conflicts_and_writes_nothing() {
        let (backend, product) = backend_with_laptop();
        let mut first = product.clone();
        first.set_quantity(5);
        assert!(backend.save_if_version_matches(&first).unwrap().is_committed());

        let mut second = product.clone();
        second.set_quantity(1);
        let outcome = backend.save_if_version_matches(&second).unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Conflict {
                expected: Version::INITIAL,
                actual: Some(Version::new(1)),
            }
        );
        assert_eq!(backend.get(product.id()).unwrap().unwrap().stock(), 5);
    }

    #[test]
    fn cas_on_locked_row_conflicts() {
        let (backend, product) = backend_with_laptop();
        let hold = backend.get_exclusive(product.id(), None).unwrap().unwrap();

        let outcome = backend.save_if_version_matches(&product).unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Held {
                version: Version::INITIAL,
            }
        );

        backend.release_exclusive(hold);
        assert!(backend.save_if_version_matches(&product).unwrap().is_committed());
    }

    #[test]
    fn cas_on_deleted_row_conflicts_with_no_actual_version() {
        let (backend, product) = backend_with_laptop();
        assert!(backend.delete(*product.id(), None).unwrap());
        let outcome = backend.save_if_version_matches(&product).unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Conflict {
                expected: Version::INITIAL,
                actual: None,
            }
        );
    }

    #[test]
    fn exclusive_read_of_missing_row_releases_lock() {
        let backend = RelationalBackend::new();
        let id = ProductId::new(5);
        assert!(backend.get_exclusive(&id, None).unwrap().is_none());
        assert!(!backend.is_locked(id));
    }

    #[test]
    fn save_unconditionally_bumps_version_and_releases() {
        let (backend, product) = backend_with_laptop();
        let hold = backend.get_exclusive(product.id(), None).unwrap().unwrap();
        assert!(backend.is_locked(*product.id()));

        let mut update = hold.record().clone();
        update.set_quantity(7);
        let saved = backend.save_unconditionally(hold, update).unwrap();

        assert_eq!(saved.stock(), 7);
        assert_eq!(saved.version(), Version::new(1));
        assert!(!backend.is_locked(*product.id()));
    }

    #[test]
    fn hold_from_another_backend_is_rejected() {
        let (a, product) = backend_with_laptop();
        let (b, _) = backend_with_laptop();
        let hold = b.get_exclusive(product.id(), None).unwrap().unwrap();

        let err = a.save_unconditionally(hold, product.clone()).unwrap_err();
        assert!(matches!(err, StorageError::ForeignHold { .. }));
        assert!(!b.is_locked(*product.id()));
        assert_eq!(a.get(product.id()).unwrap().unwrap().version(), Version::INITIAL);
    }

    #[test]
    fn hold_for_another_row_is_rejected() {
        let (backend, laptop) = backend_with_laptop();
        let phone = backend.insert(NewProduct::new("Phone", 500.0, 3)).unwrap();
        let hold = backend.get_exclusive(laptop.id(), None).unwrap().unwrap();

        let err = backend.save_unconditionally(hold, phone).unwrap_err();
        assert!(matches!(err, StorageError::ForeignHold { .. }));
        assert!(!backend.is_locked(*laptop.id()));
    }

    #[test]
    fn exclusive_read_times_out_while_locked() {
        let (backend, product) = backend_with_laptop();
        let _hold = backend.get_exclusive(product.id(), None).unwrap().unwrap();
        let err = backend
            .get_exclusive(product.id(), Some(Instant::now() + Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout { .. }));
    }

    #[test]
    fn delete_waits_for_row_lock() {
        let (backend, product) = backend_with_laptop();
        let backend = Arc::new(backend);
        let hold = backend.get_exclusive(product.id(), None).unwrap().unwrap();

        let (tx, rx) = mpsc::channel();
        let deleter = {
            let backend = Arc::clone(&backend);
            let id = *product.id();
            thread::spawn(move || {
                let removed = backend.delete(id, None).unwrap();
                tx.send(removed).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        backend.release_exclusive(hold);
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        deleter.join().unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn offline_backend_is_unavailable() {
        let (backend, product) = backend_with_laptop();
        backend.set_online(false);

        assert!(matches!(
            backend.get(product.id()),
            Err(StorageError::Unavailable { backend: "relational" })
        ));
        assert!(backend.save_if_version_matches(&product).is_err());
        assert!(backend.get_exclusive(product.id(), None).is_err());
        assert!(backend.list().is_err());

        backend.set_online(true);
        assert!(backend.get(product.id()).unwrap().is_some());
    }

    #[test]
    fn list_is_ordered_by_id() {
        let backend = RelationalBackend::new();
        for name in ["c", "a", "b"] {
            backend.insert(NewProduct::new(name, 1.0, 1)).unwrap();
        }
        let names: Vec<_> = backend
            .list()
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
