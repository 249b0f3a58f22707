//! CLI command implementations.

pub mod lock_timeout;
pub mod race;
pub mod update;

use clap::ValueEnum;
use serde::Serialize;
use std::sync::{Arc, Barrier};
use std::thread;
use stocklock_core::{
    ConcurrencyControlledStore, CoreResult, ErrorKind, IdOf, Outcome, RecordOf, StoreConfig,
    Strategy,
};
use stocklock_storage::{
    DocumentBackend, InventoryId, NewInventory, NewProduct, ProductId, RelationalBackend,
    StorageAdapter, VersionedRecord,
};

/// Result type shared by all commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Storage backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Product rows with row locks.
    Relational,
    /// Inventory documents with document locks.
    Document,
}

/// Concurrency control strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Version-checked writes.
    Optimistic,
    /// Exclusive holds.
    Pessimistic,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Optimistic => Self::Optimistic,
            StrategyArg::Pessimistic => Self::Pessimistic,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Caller-facing status for an operation outcome.
pub fn status_code<T>(result: &CoreResult<T>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(err) => match err.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::VersionConflict => 409,
            ErrorKind::InsufficientQuantity => 422,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::BackendUnavailable => 503,
            ErrorKind::LockTimeout => 504,
        },
    }
}

/// State of a record as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct RecordState {
    /// Display form of the id.
    pub id: String,
    /// Quantity or stock.
    pub quantity: u32,
    /// Version counter.
    pub version: u64,
}

impl RecordState {
    fn of<R: VersionedRecord>(record: &R) -> Self {
        Self {
            id: record.id().to_string(),
            quantity: record.quantity(),
            version: record.version().as_u64(),
        }
    }
}

/// Result of one caller's operation.
#[derive(Debug, Serialize)]
pub struct AttemptReport {
    /// Caller index.
    pub caller: usize,
    /// Outcome name.
    pub outcome: &'static str,
    /// Caller-facing status.
    pub status: u16,
    /// Version written, if the operation committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Error message, if the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AttemptReport {
    fn of<R: VersionedRecord>(caller: usize, result: &CoreResult<R>) -> Self {
        Self {
            caller,
            outcome: Outcome::of(result).as_str(),
            status: status_code(result),
            version: result.as_ref().ok().map(|r| r.version().as_u64()),
            message: result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Summary of a concurrent run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Command name.
    pub command: &'static str,
    /// Backend name.
    pub backend: &'static str,
    /// Strategy name.
    pub strategy: &'static str,
    /// Number of concurrent callers.
    pub callers: usize,
    /// Callers whose operation committed.
    pub successes: usize,
    /// Per-caller results in caller order.
    pub attempts: Vec<AttemptReport>,
    /// State before the run.
    pub initial: RecordState,
    /// State after the run.
    pub last: RecordState,
}

impl RunReport {
    /// Prints the report in the requested format.
    pub fn emit(&self, format: OutputFormat) -> CommandResult {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(self)?),
            OutputFormat::Text => {
                println!(
                    "{} on {} backend, {} strategy, {} callers",
                    self.command, self.backend, self.strategy, self.callers
                );
                println!(
                    "Initial: {} quantity={} version={}",
                    self.initial.id, self.initial.quantity, self.initial.version
                );
                for attempt in &self.attempts {
                    match &attempt.message {
                        None => println!(
                            "  caller {:>2}: {} ({}) -> v{}",
                            attempt.caller,
                            attempt.outcome,
                            attempt.status,
                            attempt.version.unwrap_or_default()
                        ),
                        Some(message) => println!(
                            "  caller {:>2}: {} ({}) {}",
                            attempt.caller, attempt.outcome, attempt.status, message
                        ),
                    }
                }
                println!("Successes: {}/{}", self.successes, self.callers);
                println!(
                    "Final: {} quantity={} version={}",
                    self.last.id, self.last.quantity, self.last.version
                );
            }
        }
        Ok(())
    }
}

/// Seeds a product and returns a store over it.
pub fn seed_product(
    quantity: u32,
    config: StoreConfig,
) -> CoreResult<(ConcurrencyControlledStore<RelationalBackend>, ProductId)> {
    let backend = Arc::new(RelationalBackend::new());
    let product =
        backend.insert(NewProduct::new("Laptop", 999.0, quantity).description("demo"))?;
    Ok((
        ConcurrencyControlledStore::with_config(backend, config),
        *product.id(),
    ))
}

/// Seeds an inventory item and returns a store over it.
pub fn seed_inventory(
    quantity: u32,
    config: StoreConfig,
) -> CoreResult<(ConcurrencyControlledStore<DocumentBackend>, InventoryId)> {
    let backend = Arc::new(DocumentBackend::new());
    let item = backend.insert(
        NewInventory::new("Widget", 2.5, quantity)
            .with_id(InventoryId::new("widget-001"))
            .category("demo"),
    )?;
    Ok((
        ConcurrencyControlledStore::with_config(backend, config),
        item.id().clone(),
    ))
}

/// Runs `op` once on each of `callers` threads, released together, and
/// reports the results in caller order.
pub fn run_callers<A, F>(
    command: &'static str,
    strategy: Strategy,
    store: &ConcurrencyControlledStore<A>,
    id: &IdOf<A>,
    callers: usize,
    op: F,
) -> Result<RunReport, Box<dyn std::error::Error>>
where
    A: StorageAdapter + 'static,
    F: Fn(&ConcurrencyControlledStore<A>, &IdOf<A>, usize) -> CoreResult<RecordOf<A>>
        + Send
        + Sync
        + 'static,
{
    let initial = RecordState::of(&store.get(id)?);
    let op = Arc::new(op);
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|caller| {
            let store = store.clone();
            let id = id.clone();
            let op = Arc::clone(&op);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op(&store, &id, caller)
            })
        })
        .collect();

    let mut attempts = Vec::with_capacity(callers);
    for (caller, handle) in handles.into_iter().enumerate() {
        let result = handle
            .join()
            .map_err(|_| format!("caller {caller} panicked"))?;
        attempts.push(AttemptReport::of(caller, &result));
    }

    Ok(RunReport {
        command,
        backend: store.adapter().name(),
        strategy: strategy.as_str(),
        callers,
        successes: attempts.iter().filter(|a| a.status == 200).count(),
        attempts,
        initial,
        last: RecordState::of(&store.get(id)?),
    })
}
