//! Lock-timeout command implementation.
//!
//! One caller takes the exclusive hold and keeps it; a second caller
//! attempts a pessimistic decrease with a deadline.

use super::{seed_inventory, seed_product, status_code, BackendArg, CommandResult, OutputFormat};
use serde::Serialize;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use stocklock_core::{ConcurrencyControlledStore, IdOf, LockWait, Outcome, StoreConfig};
use stocklock_storage::StorageAdapter;
use tracing::info;

/// Result of the lock-timeout command.
#[derive(Debug, Serialize)]
pub struct LockTimeoutReport {
    /// Backend name.
    pub backend: &'static str,
    /// How long the first caller held the record.
    pub hold_ms: u64,
    /// Deadline given to the second caller.
    pub timeout_ms: u64,
    /// How long the second caller actually waited.
    pub waited_ms: u64,
    /// Outcome of the second caller.
    pub outcome: &'static str,
    /// Caller-facing status of the second caller.
    pub status: u16,
    /// Error message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Runs the lock-timeout command.
pub fn run(
    backend: BackendArg,
    hold: Duration,
    timeout: Duration,
    format: OutputFormat,
) -> CommandResult {
    info!(
        ?backend,
        hold_ms = millis(hold),
        timeout_ms = millis(timeout),
        "starting lock timeout demo"
    );
    let report = match backend {
        BackendArg::Relational => {
            let (store, id) = seed_product(5, StoreConfig::default())?;
            contend(&store, &id, hold, timeout)?
        }
        BackendArg::Document => {
            let (store, id) = seed_inventory(5, StoreConfig::default())?;
            contend(&store, &id, hold, timeout)?
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "Holder kept the {} record locked for {} ms",
                report.backend, report.hold_ms
            );
            println!(
                "Contender gave up after {} ms (deadline {} ms): {} ({})",
                report.waited_ms, report.timeout_ms, report.outcome, report.status
            );
            if let Some(message) = &report.message {
                println!("  {message}");
            }
        }
    }
    Ok(())
}

fn contend<A: StorageAdapter + 'static>(
    store: &ConcurrencyControlledStore<A>,
    id: &IdOf<A>,
    hold: Duration,
    timeout: Duration,
) -> Result<LockTimeoutReport, Box<dyn std::error::Error>> {
    let (granted_tx, granted_rx) = mpsc::channel();
    let holder = {
        let adapter = Arc::clone(store.adapter());
        let id = id.clone();
        thread::spawn(move || -> Result<(), String> {
            let held = adapter
                .get_exclusive(&id, None)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("{id} disappeared"))?;
            let _ = granted_tx.send(());
            thread::sleep(hold);
            adapter.release_exclusive(held);
            Ok(())
        })
    };
    granted_rx.recv()?;

    let started = Instant::now();
    let result = store.decrease_quantity_pessimistic_with(id, 1, LockWait::Timeout(timeout));
    let waited = started.elapsed();
    holder.join().map_err(|_| "holder panicked")??;

    Ok(LockTimeoutReport {
        backend: store.adapter().name(),
        hold_ms: millis(hold),
        timeout_ms: millis(timeout),
        waited_ms: millis(waited),
        outcome: Outcome::of(&result).as_str(),
        status: status_code(&result),
        message: result.err().map(|e| e.to_string()),
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
