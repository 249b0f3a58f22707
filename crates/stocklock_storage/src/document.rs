//! Document-style backend for inventory.
//!
//! Each document is stored as an encoded CBOR blob under its string id,
//! the way a document database keeps BSON. An exclusive hold stands for a
//! document write lock taken inside a multi-statement transaction; a CAS
//! against a locked document reports a write conflict immediately.

use crate::adapter::{CasOutcome, ExclusiveHold, StorageAdapter};
use crate::error::{StorageError, StorageResult};
use crate::lock::LockTable;
use crate::record::{validate_price, Inventory, InventoryId, NewInventory, Version};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const NAME: &str = "document";

/// In-process inventory collection with document-level exclusive holds.
#[derive(Debug)]
pub struct DocumentBackend {
    documents: RwLock<HashMap<InventoryId, Vec<u8>>>,
    doc_locks: Arc<LockTable<InventoryId>>,
    online: AtomicBool,
}

impl Default for DocumentBackend {
    fn default() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            doc_locks: Arc::new(LockTable::new()),
            online: AtomicBool::new(true),
        }
    }
}

fn encode(document: &Inventory) -> StorageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(document, &mut bytes)
        .map_err(|e| StorageError::Codec(format!("encoding {}: {e:?}", document.id)))?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> StorageResult<Inventory> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Codec(format!("decoding: {e:?}")))
}

impl DocumentBackend {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new document with the initial version.
    ///
    /// A random id is generated unless the draft carries one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateKey`] if the id is taken, an invalid
    /// field error for a bad price, or an error if the backend is offline.
    pub fn insert(&self, new: NewInventory) -> StorageResult<Inventory> {
        self.ensure_online()?;
        let price = validate_price(new.price)?;
        let document = Inventory {
            id: new.id.unwrap_or_else(InventoryId::random),
            item_name: new.item_name,
            category: new.category,
            price,
            quantity: new.quantity,
            version: Version::INITIAL,
        };
        let bytes = encode(&document)?;

        let mut documents = self.documents.write();
        if documents.contains_key(&document.id) {
            return Err(StorageError::DuplicateKey {
                key: document.id.to_string(),
            });
        }
        documents.insert(document.id.clone(), bytes);
        debug!(record_id = %document.id, "document inserted");
        Ok(document)
    }

    /// Returns every document ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is offline or a document is unreadable.
    pub fn list(&self) -> StorageResult<Vec<Inventory>> {
        self.ensure_online()?;
        let mut all = self
            .documents
            .read()
            .values()
            .map(|bytes| decode(bytes))
            .collect::<StorageResult<Vec<_>>>()?;
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    /// Returns the first document (in id order) whose item name matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is offline or a document is unreadable.
    pub fn find_by_item_name(&self, item_name: &str) -> StorageResult<Option<Inventory>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|doc| doc.item_name == item_name))
    }

    /// Deletes a document, waiting for any exclusive hold on it.
    ///
    /// Returns whether a document was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockTimeout`] if the document stays locked
    /// past `deadline`, or an error if the backend is offline.
    pub fn delete(&self, id: &InventoryId, deadline: Option<Instant>) -> StorageResult<bool> {
        self.ensure_online()?;
        let _doc_lock = self.doc_locks.acquire(id, deadline)?;
        let removed = self.documents.write().remove(id).is_some();
        debug!(record_id = %id, removed, "document delete");
        Ok(removed)
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Returns true if some caller holds the document lock on `id`.
    #[must_use]
    pub fn is_locked(&self, id: &InventoryId) -> bool {
        self.doc_locks.is_held(id)
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

    fn read_document(&self, id: &InventoryId) -> StorageResult<Option<Inventory>> {
        self.documents
            .read()
            .get(id)
            .map(|bytes| decode(bytes))
            .transpose()
    }

    #[cfg(test)]
    fn put_raw(&self, id: InventoryId, bytes: Vec<u8>) {
        self.documents.write().insert(id, bytes);
    }
}

impl StorageAdapter for DocumentBackend {
    type Record = Inventory;

    fn name(&self) -> &'static str {
        NAME
    }

    fn get(&self, id: &InventoryId) -> StorageResult<Option<Inventory>> {
        self.ensure_online()?;
        self.read_document(id)
    }

    fn save_if_version_matches(&self, record: &Inventory) -> StorageResult<CasOutcome<Inventory>> {
        self.ensure_online()?;
        let expected = record.version;
        let mut committed = record.clone();
        committed.version = expected.next();
        let bytes = encode(&committed)?;

        let mut documents = self.documents.write();
        let Some(stored) = documents.get_mut(&record.id) else {
            return Ok(CasOutcome::Conflict {
                expected,
                actual: None,
            });
        };

        let actual = decode(stored)?.version;
        if self.doc_locks.is_held(&record.id) {
            debug!(record_id = %record.id, version = %actual, "document is held");
            return Ok(CasOutcome::Held { version: actual });
        }
        if actual != expected {
            debug!(record_id = %record.id, %expected, %actual, "write conflict");
            return Ok(CasOutcome::Conflict {
                expected,
                actual: Some(actual),
            });
        }

        *stored = bytes;
        Ok(CasOutcome::Committed(committed))
    }

    fn get_exclusive(
        &self,
        id: &InventoryId,
        deadline: Option<Instant>,
    ) -> StorageResult<Option<ExclusiveHold<Inventory>>> {
        self.ensure_online()?;
        let guard = self.doc_locks.acquire(id, deadline)?;
        self.ensure_online()?;
        Ok(self
            .read_document(id)?
            .map(|document| ExclusiveHold::new(document, guard)))
    }

    fn save_unconditionally(
        &self,
        hold: ExclusiveHold<Inventory>,
        record: Inventory,
    ) -> StorageResult<Inventory> {
        if !hold.guard().is_from(&self.doc_locks) || *hold.id() != record.id {
            return Err(StorageError::ForeignHold {
                held: hold.id().to_string(),
                target: record.id.to_string(),
            });
        }
        self.ensure_online()?;

        let mut documents = self.documents.write();
        let Some(stored) = documents.get_mut(&record.id) else {
            return Err(StorageError::Corrupted(format!(
                "{} vanished while locked",
                record.id
            )));
        };

        let mut committed = record;
        committed.version = decode(stored)?.version.next();
        *stored = encode(&committed)?;
        drop(documents);
        drop(hold);
        Ok(committed)
    }
}
