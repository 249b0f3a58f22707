//! Concurrency scenarios run against both backends.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use stocklock_core::{
    ConcurrencyControlledStore, CoreError, CoreResult, ErrorKind, IdOf, LockWait, Outcome,
    RecordOf, StoreConfig,
};
use stocklock_storage::{
    DocumentBackend, NewInventory, NewProduct, RelationalBackend, StorageAdapter, Version,
    VersionedRecord,
};

fn relational(
    quantity: u32,
    config: StoreConfig,
) -> (ConcurrencyControlledStore<RelationalBackend>, IdOf<RelationalBackend>) {
    let backend = Arc::new(RelationalBackend::new());
    let id = *backend
        .insert(NewProduct::new("Laptop", 999.0, quantity))
        .unwrap()
        .id();
    (ConcurrencyControlledStore::with_config(backend, config), id)
}

fn document(
    quantity: u32,
    config: StoreConfig,
) -> (ConcurrencyControlledStore<DocumentBackend>, IdOf<DocumentBackend>) {
    let backend = Arc::new(DocumentBackend::new());
    let id = backend
        .insert(NewInventory::new("Widget", 2.5, quantity).category("parts"))
        .unwrap()
        .id()
        .clone();
    (ConcurrencyControlledStore::with_config(backend, config), id)
}

fn racing() -> StoreConfig {
    StoreConfig::new().processing_delay(Duration::from_millis(30))
}

/// Runs `op` on `threads` threads released together and collects outcomes.
fn run_concurrently<A, F>(
    store: &ConcurrencyControlledStore<A>,
    id: &IdOf<A>,
    threads: usize,
    op: F,
) -> Vec<CoreResult<RecordOf<A>>>
where
    A: StorageAdapter + 'static,
    F: Fn(&ConcurrencyControlledStore<A>, &IdOf<A>) -> CoreResult<RecordOf<A>>
        + Send
        + Sync
        + 'static,
{
    let op = Arc::new(op);
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = store.clone();
            let id = id.clone();
            let op = Arc::clone(&op);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op(&store, &id)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn count(results: &[CoreResult<impl Sized>], outcome: Outcome) -> usize {
    results.iter().filter(|r| Outcome::of(*r) == outcome).count()
}

fn scenario_a<A: StorageAdapter + 'static>(store: ConcurrencyControlledStore<A>, id: IdOf<A>) {
    let results = run_concurrently(&store, &id, 2, |store, id| {
        store.decrease_quantity_optimistic(id, 1)
    });

    assert_eq!(count(&results, Outcome::Success), 1);
    let loser = results.iter().find(|r| r.is_err()).unwrap();
    let kind = loser.as_ref().unwrap_err().kind();
    assert!(
        matches!(kind, ErrorKind::InsufficientQuantity | ErrorKind::VersionConflict),
        "unexpected loser kind {kind}"
    );

    let record = store.get(&id).unwrap();
    assert_eq!(record.quantity(), 0);
    assert_eq!(record.version(), Version::new(1));
}

#[test]
fn scenario_a_last_unit_optimistic_relational() {
    let (store, id) = relational(1, racing());
    scenario_a(store, id);
}

#[test]
fn scenario_a_last_unit_optimistic_document() {
    let (store, id) = document(1, racing());
    scenario_a(store, id);
}

fn scenario_b<A: StorageAdapter + 'static>(store: ConcurrencyControlledStore<A>, id: IdOf<A>) {
    let results = run_concurrently(&store, &id, 2, |store, id| {
        store.decrease_quantity_pessimistic(id, 3)
    });

    assert_eq!(count(&results, Outcome::Success), 2);
    let record = store.get(&id).unwrap();
    assert_eq!(record.quantity(), 4);
    assert_eq!(record.version(), Version::new(2));
}

#[test]
fn scenario_b_pessimistic_decreases_serialize_relational() {
    let (store, id) = relational(10, racing());
    scenario_b(store, id);
}

#[test]
fn scenario_b_pessimistic_decreases_serialize_document() {
    let (store, id) = document(10, racing());
    scenario_b(store, id);
}

fn scenario_c<A: StorageAdapter + 'static>(store: ConcurrencyControlledStore<A>, id: IdOf<A>) {
    let granted = Arc::new(Barrier::new(2));
    let holder = {
        let store = store.clone();
        let id = id.clone();
        let granted = Arc::clone(&granted);
        thread::spawn(move || {
            let hold = store.adapter().get_exclusive(&id, None).unwrap().unwrap();
            granted.wait();
            thread::sleep(Duration::from_millis(500));
            store.adapter().release_exclusive(hold);
        })
    };

    granted.wait();
    let started = Instant::now();
    let err = store
        .decrease_quantity_pessimistic_with(&id, 1, LockWait::Timeout(Duration::from_millis(100)))
        .unwrap_err();
    let elapsed = started.elapsed();
    holder.join().unwrap();

    assert_eq!(err.kind(), ErrorKind::LockTimeout);
    assert!(elapsed >= Duration::from_millis(100), "gave up early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(450), "waited for holder: {elapsed:?}");

    let record = store.get(&id).unwrap();
    assert_eq!(record.quantity(), 5);
    assert_eq!(record.version(), Version::INITIAL);
}

#[test]
fn scenario_c_lock_timeout_relational() {
    let (store, id) = relational(5, StoreConfig::default());
    scenario_c(store, id);
}

#[test]
fn scenario_c_lock_timeout_document() {
    let (store, id) = document(5, StoreConfig::default());
    scenario_c(store, id);
}

#[test]
fn scenario_d_missing_record_relational() {
    let (store, _) = relational(5, StoreConfig::default());
    let missing = stocklock_storage::ProductId(4242);
    let err = store
        .update_optimistic(&missing, &stocklock_storage::ProductPatch::new().stock(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.adapter().len(), 1);
}

#[test]
fn scenario_d_missing_record_document() {
    let (store, _) = document(5, StoreConfig::default());
    let missing = stocklock_storage::InventoryId::new("no-such-item");
    let err = store
        .update_optimistic(&missing, &stocklock_storage::InventoryPatch::new().quantity(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.adapter().len(), 1);
}

fn optimistic_commits_match_versions<A: StorageAdapter + 'static>(
    store: ConcurrencyControlledStore<A>,
    id: IdOf<A>,
) {
    let initial = store.get(&id).unwrap();
    let results = run_concurrently(&store, &id, 8, |store, id| {
        store.decrease_quantity_optimistic(id, 1)
    });

    let successes = count(&results, Outcome::Success);
    let conflicts = count(&results, Outcome::VersionConflict);
    assert!(successes >= 1);
    assert_eq!(successes + conflicts, results.len());

    let mut committed: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|r| r.version())
        .collect();
    committed.sort();
    committed.dedup();
    assert_eq!(committed.len(), successes, "two commits share a version");

    let last = store.get(&id).unwrap();
    assert_eq!(last.version().as_u64(), initial.version().as_u64() + successes as u64);
    assert_eq!(last.quantity(), initial.quantity() - successes as u32);
}

#[test]
fn concurrent_optimistic_writers_one_commit_per_version_relational() {
    let (store, id) = relational(100, racing());
    optimistic_commits_match_versions(store, id);
}

#[test]
fn concurrent_optimistic_writers_one_commit_per_version_document() {
    let (store, id) = document(100, racing());
    optimistic_commits_match_versions(store, id);
}

fn pessimistic_writers_apply_serially<A: StorageAdapter + 'static>(
    store: ConcurrencyControlledStore<A>,
    id: IdOf<A>,
) {
    let results = run_concurrently(&store, &id, 6, |store, id| {
        store.decrease_quantity_pessimistic(id, 2)
    });

    assert_eq!(count(&results, Outcome::Success), 6);
    let mut versions: Vec<_> = results
        .iter()
        .map(|r| r.as_ref().unwrap().version().as_u64())
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, [1, 2, 3, 4, 5, 6]);

    let record = store.get(&id).unwrap();
    assert_eq!(record.quantity(), 8);
    assert_eq!(record.version(), Version::new(6));
}

#[test]
fn concurrent_pessimistic_writers_serialize_relational() {
    let (store, id) = relational(20, StoreConfig::new().processing_delay(Duration::from_millis(5)));
    pessimistic_writers_apply_serially(store, id);
}

#[test]
fn concurrent_pessimistic_writers_serialize_document() {
    let (store, id) = document(20, StoreConfig::new().processing_delay(Duration::from_millis(5)));
    pessimistic_writers_apply_serially(store, id);
}

fn pessimistic_guard_uses_state_under_hold<A: StorageAdapter + 'static>(
    store: ConcurrencyControlledStore<A>,
    id: IdOf<A>,
) {
    let results = run_concurrently(&store, &id, 4, |store, id| {
        store.decrease_quantity_pessimistic(id, 2)
    });

    assert_eq!(count(&results, Outcome::Success), 2);
    assert_eq!(count(&results, Outcome::InsufficientQuantity), 2);
    assert_eq!(store.get(&id).unwrap().quantity(), 1);
}

#[test]
fn pessimistic_overdraw_is_rejected_under_hold_relational() {
    let (store, id) = relational(5, racing());
    pessimistic_guard_uses_state_under_hold(store, id);
}

#[test]
fn pessimistic_overdraw_is_rejected_under_hold_document() {
    let (store, id) = document(5, racing());
    pessimistic_guard_uses_state_under_hold(store, id);
}

#[test]
fn optimistic_write_fails_fast_while_record_is_held() {
    let (store, id) = document(5, StoreConfig::default());
    let hold = store.adapter().get_exclusive(&id, None).unwrap().unwrap();

    let started = Instant::now();
    let err = store.decrease_quantity_optimistic(&id, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(matches!(err, CoreError::VersionConflict { held: true, .. }));
    assert!(err.to_string().ends_with("held by an exclusive writer at v0"));

    store.adapter().release_exclusive(hold);
    assert!(store.decrease_quantity_optimistic(&id, 1).is_ok());
}

#[test]
fn offline_backend_never_reports_conflict() {
    let (store, id) = relational(5, StoreConfig::default());
    store.adapter().set_online(false);

    let results = run_concurrently(&store, &id, 4, |store, id| {
        store.decrease_quantity_optimistic(id, 1)
    });
    assert_eq!(
        count(&results, Outcome::Failed(ErrorKind::BackendUnavailable)),
        4
    );
}
