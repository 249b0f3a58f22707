//! Keyed exclusive holds.
//!
//! A [`LockTable`] hands out at most one [`LockGuard`] per key. Callers
//! that find the key held queue up behind the holder and are served in
//! arrival order. A waiter whose deadline passes leaves the queue, so an
//! abandoned wait never keeps a key held.

use crate::error::{StorageError, StorageResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-key wait queues. The front ticket of a queue is the current holder.
struct LockState<K> {
    queues: HashMap<K, VecDeque<u64>>,
    next_ticket: u64,
}

impl<K: Eq + Hash> LockState<K> {
    fn holder(&self, key: &K) -> Option<u64> {
        self.queues.get(key).and_then(|q| q.front().copied())
    }

    fn remove_ticket(&mut self, key: &K, ticket: u64) {
        let now_empty = match self.queues.get_mut(key) {
            Some(queue) => {
                if queue.front() == Some(&ticket) {
                    queue.pop_front();
                } else {
                    queue.retain(|t| *t != ticket);
                }
                queue.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.queues.remove(key);
        }
    }
}

/// A table of exclusive holds keyed by record identity.
pub struct LockTable<K> {
    state: Mutex<LockState<K>>,
    released: Condvar,
}

impl<K> Default for LockTable<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(LockState {
                queues: HashMap::new(),
                next_ticket: 0,
            }),
            released: Condvar::new(),
        }
    }
}

impl<K> LockTable<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the hold on `key`, blocking while another caller has it.
    ///
    /// With `deadline = None` this waits indefinitely. Otherwise it returns
    /// [`StorageError::LockTimeout`] once the deadline passes without the
    /// hold being granted. A deadline already in the past still succeeds if
    /// the key is free.
    pub fn acquire(
        self: &Arc<Self>,
        key: &K,
        deadline: Option<Instant>,
    ) -> StorageResult<LockGuard<K>> {
        let started = Instant::now();
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state
            .queues
            .entry(key.clone())
            .or_default()
            .push_back(ticket);

        loop {
            if state.holder(key) == Some(ticket) {
                return Ok(self.guard(key, ticket));
            }

            match deadline {
                None => self.released.wait(&mut state),
                Some(deadline) => {
                    if self.released.wait_until(&mut state, deadline).timed_out() {
                        // Released in the same instant the deadline hit.
                        if state.holder(key) == Some(ticket) {
                            return Ok(self.guard(key, ticket));
                        }
                        state.remove_ticket(key, ticket);
                        return Err(StorageError::LockTimeout {
                            key: key.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                }
            }
        }
    }

    /// Acquires the hold on `key` only if nobody holds or waits for it.
    pub fn try_acquire(self: &Arc<Self>, key: &K) -> Option<LockGuard<K>> {
        let mut state = self.state.lock();
        if state.queues.contains_key(key) {
            return None;
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queues.insert(key.clone(), VecDeque::from([ticket]));
        Some(self.guard(key, ticket))
    }

    /// Returns true if some caller currently holds `key`.
    #[must_use]
    pub fn is_held(&self, key: &K) -> bool {
        self.state.lock().holder(key).is_some()
    }

    /// Returns the number of callers queued behind the holder of `key`.
    #[must_use]
    pub fn waiting(&self, key: &K) -> usize {
        self.state
            .lock()
            .queues
            .get(key)
            .map_or(0, |q| q.len().saturating_sub(1))
    }

    /// Returns the number of keys currently held.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    fn guard(self: &Arc<Self>, key: &K, ticket: u64) -> LockGuard<K> {
        LockGuard {
            table: Arc::clone(self),
            key: key.clone(),
            ticket,
            acquired_at: Instant::now(),
        }
    }
}

impl<K: Eq + Hash> LockTable<K> {
    fn release(&self, key: &K, ticket: u64) {
        self.state.lock().remove_ticket(key, ticket);
        self.released.notify_all();
    }
}

impl<K> fmt::Debug for LockTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("held", &self.state.lock().queues.len())
            .finish_non_exhaustive()
    }
}

/// An exclusive hold on one key. Dropping the guard releases the hold.
pub struct LockGuard<K: Eq + Hash> {
    table: Arc<LockTable<K>>,
    key: K,
    ticket: u64,
    acquired_at: Instant,
}

impl<K: Eq + Hash> LockGuard<K> {
    /// Returns the held key.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns how long the hold has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Returns true if this guard was issued by `table`.
    #[must_use]
    pub fn is_from(&self, table: &Arc<LockTable<K>>) -> bool {
        Arc::ptr_eq(&self.table, table)
    }
}

impl<K: Eq + Hash> Drop for LockGuard<K> {
    fn drop(&mut self) {
        self.table.release(&self.key, self.ticket);
    }
}

impl<K: Eq + Hash + fmt::Debug> fmt::Debug for LockGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("held_for", &self.held_for())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn table() -> Arc<LockTable<u64>> {
        Arc::new(LockTable::new())
    }

    #[test]
    fn uncontended_acquire_and_release() {
        let locks = table();
        let guard = locks.acquire(&1, None).unwrap();
        assert!(locks.is_held(&1));
        assert!(!locks.is_held(&2));
        drop(guard);
        assert!(!locks.is_held(&1));
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let locks = table();
        let _a = locks.acquire(&1, None).unwrap();
        let b = locks.acquire(&2, Some(Instant::now()));
        assert!(b.is_ok());
    }

    #[test]
    fn try_acquire_fails_while_held() {
        let locks = table();
        let guard = locks.try_acquire(&1).unwrap();
        assert!(locks.try_acquire(&1).is_none());
        drop(guard);
        assert!(locks.try_acquire(&1).is_some());
    }

    #[test]
    fn waiter_blocks_until_release() {
        let locks = table();
        let guard = locks.acquire(&1, None).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let _g = locks.acquire(&1, None).unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert!(!locks.is_held(&1));
    }

    #[test]
    fn deadline_expires_with_lock_timeout() {
        let locks = table();
        let _guard = locks.acquire(&1, None).unwrap();

        let started = Instant::now();
        let err = locks
            .acquire(&1, Some(Instant::now() + Duration::from_millis(50)))
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, StorageError::LockTimeout { .. }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(locks.waiting(&1), 0);
    }

    #[test]
    fn timed_out_waiter_does_not_keep_key_held() {
        let locks = table();
        let guard = locks.acquire(&1, None).unwrap();
        let _ = locks.acquire(&1, Some(Instant::now() + Duration::from_millis(10)));
        drop(guard);
        assert!(!locks.is_held(&1));
        assert!(locks.try_acquire(&1).is_some());
    }

    #[test]
    fn past_deadline_succeeds_when_free() {
        let locks = table();
        let guard = locks.acquire(&1, Some(Instant::now() - Duration::from_millis(1)));
        assert!(guard.is_ok());
    }

    #[test]
    fn waiters_are_served_in_arrival_order() {
        let locks = table();
        let guard = locks.acquire(&1, None).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let waiter_locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _g = waiter_locks.acquire(&1, None).unwrap();
                order.lock().push(i);
            }));
            // Make sure waiter `i` is queued before `i + 1` arrives.
            while locks.waiting(&1) < i + 1 {
                thread::yield_now();
            }
        }

        drop(guard);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn guard_knows_its_table() {
        let a = table();
        let b = table();
        let guard = a.acquire(&1, None).unwrap();
        assert!(guard.is_from(&a));
        assert!(!guard.is_from(&b));
        assert_eq!(*guard.key(), 1);
    }
}
