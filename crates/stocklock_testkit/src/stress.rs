//! Stress tests for StockLock.
//!
//! These drivers hammer a single record from many threads and tally how
//! each strategy resolves the contention.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use stocklock_core::{
    retry_with_policy, ConcurrencyControlledStore, IdOf, Outcome, RetryPolicy, Strategy,
};
use stocklock_storage::{StorageAdapter, VersionedRecord};

use crate::fixtures::{SeededInventory, SeededProduct};

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Decrease operations issued by each thread.
    pub ops_per_thread: usize,
    /// Units removed by each operation.
    pub amount: u32,
    /// Quantity the record starts with.
    pub initial_quantity: u32,
    /// Simulated work between read and write.
    pub processing_delay: Duration,
    /// Concurrency control strategy.
    pub strategy: Strategy,
    /// Caller-side retry applied to each operation.
    pub retry: RetryPolicy,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            ops_per_thread: 25,
            amount: 1,
            initial_quantity: 1_000,
            processing_delay: Duration::ZERO,
            strategy: Strategy::Optimistic,
            retry: RetryPolicy::never(),
        }
    }
}

impl StressConfig {
    /// Total number of operations the run issues.
    #[must_use]
    pub fn total_ops(&self) -> usize {
        self.threads * self.ops_per_thread
    }
}

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    /// Strategy under test.
    pub strategy: &'static str,
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations that committed.
    pub successful_ops: usize,
    /// Failed operations keyed by outcome name.
    pub failures: BTreeMap<&'static str, usize>,
    /// Quantity stored after the run.
    pub final_quantity: u32,
    /// Version stored after the run.
    pub final_version: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressReport {
    /// Returns the number of failures with the given outcome.
    #[must_use]
    pub fn failures_of(&self, outcome: Outcome) -> usize {
        self.failures.get(outcome.as_str()).copied().unwrap_or(0)
    }

    /// Returns the number of failed operations.
    #[must_use]
    pub fn failed_ops(&self) -> usize {
        self.failures.values().sum()
    }

    /// Serializes the report as pretty JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ({}) ===", name, self.strategy);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        for (outcome, count) in &self.failures {
            println!("{}: {}", outcome, count);
        }
        println!("Final quantity: {}", self.final_quantity);
        println!("Final version: {}", self.final_version);
        println!("Duration: {} ms", self.duration_ms);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Runs concurrent decreases of `config.amount` against `id`.
pub fn stress_decrease<A>(
    store: &ConcurrencyControlledStore<A>,
    id: &IdOf<A>,
    config: &StressConfig,
) -> StressReport
where
    A: StorageAdapter + 'static,
{
    let successful = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(
        Outcome::failures()
            .map(|outcome| (outcome.as_str(), AtomicUsize::new(0)))
            .collect::<BTreeMap<_, _>>(),
    );
    let barrier = Arc::new(Barrier::new(config.threads));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let store = store.clone();
            let id = id.clone();
            let successful = Arc::clone(&successful);
            let failures = Arc::clone(&failures);
            let barrier = Arc::clone(&barrier);
            let config = config.clone();

            thread::spawn(move || {
                barrier.wait();
                for _ in 0..config.ops_per_thread {
                    let result = retry_with_policy(&config.retry, |_| match config.strategy {
                        Strategy::Optimistic => {
                            store.decrease_quantity_optimistic(&id, config.amount)
                        }
                        Strategy::Pessimistic => {
                            store.decrease_quantity_pessimistic(&id, config.amount)
                        }
                    });
                    match Outcome::of(&result) {
                        Outcome::Success => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        outcome => {
                            if let Some(counter) = failures.get(outcome.as_str()) {
                                counter.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let duration = start.elapsed();
    let record = store.get(id).expect("Stressed record disappeared");
    let total_ops = config.total_ops();
    let ops_per_second = if duration.as_secs_f64() > 0.0 {
        total_ops as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    StressReport {
        strategy: config.strategy.as_str(),
        total_ops,
        successful_ops: successful.load(Ordering::Relaxed),
        failures: failures
            .iter()
            .map(|(name, count)| (*name, count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect(),
        final_quantity: record.quantity(),
        final_version: record.version().as_u64(),
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        ops_per_second,
    }
}

/// Runs [`stress_decrease`] against a freshly seeded product.
pub fn stress_products(config: &StressConfig) -> StressReport {
    let seeded = SeededProduct::with_config(config.initial_quantity, store_config(config));
    stress_decrease(seeded.service.store(), &seeded.id, config)
}

/// Runs [`stress_decrease`] against a freshly seeded inventory item.
pub fn stress_inventory(config: &StressConfig) -> StressReport {
    let seeded = SeededInventory::with_config(config.initial_quantity, store_config(config));
    stress_decrease(seeded.service.store(), &seeded.id, config)
}

fn store_config(config: &StressConfig) -> stocklock_core::StoreConfig {
    stocklock_core::StoreConfig::new().processing_delay(config.processing_delay)
}
