//! Race command implementation.
//!
//! Seeds one record and lets every caller try to remove the same amount
//! from it at once.

use super::{
    run_callers, seed_inventory, seed_product, BackendArg, CommandResult, OutputFormat,
    RunReport, StrategyArg,
};
use std::time::Duration;
use stocklock_core::{ConcurrencyControlledStore, IdOf, StoreConfig, Strategy};
use stocklock_storage::StorageAdapter;
use tracing::info;

/// Options for the race command.
#[derive(Debug, Clone)]
pub struct RaceOptions {
    /// Backend to seed.
    pub backend: BackendArg,
    /// Strategy every caller uses.
    pub strategy: StrategyArg,
    /// Number of concurrent callers.
    pub callers: usize,
    /// Starting quantity.
    pub quantity: u32,
    /// Units each caller removes.
    pub amount: u32,
    /// Simulated work between read and write.
    pub delay: Duration,
    /// Lock wait for pessimistic callers.
    pub lock_timeout: Option<Duration>,
}

/// Runs the race command.
pub fn run(options: &RaceOptions, format: OutputFormat) -> CommandResult {
    info!(
        backend = ?options.backend,
        strategy = ?options.strategy,
        callers = options.callers,
        quantity = options.quantity,
        amount = options.amount,
        "starting decrease race"
    );
    let mut config = StoreConfig::new().processing_delay(options.delay);
    if let Some(timeout) = options.lock_timeout {
        config = config.lock_timeout(timeout);
    }

    let report = match options.backend {
        BackendArg::Relational => {
            let (store, id) = seed_product(options.quantity, config)?;
            race(&store, &id, options)?
        }
        BackendArg::Document => {
            let (store, id) = seed_inventory(options.quantity, config)?;
            race(&store, &id, options)?
        }
    };
    report.emit(format)
}

fn race<A: StorageAdapter + 'static>(
    store: &ConcurrencyControlledStore<A>,
    id: &IdOf<A>,
    options: &RaceOptions,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let strategy = Strategy::from(options.strategy);
    let amount = options.amount;
    run_callers("race", strategy, store, id, options.callers, move |store, id, _| {
        match strategy {
            Strategy::Optimistic => store.decrease_quantity_optimistic(id, amount),
            Strategy::Pessimistic => store.decrease_quantity_pessimistic(id, amount),
        }
    })
}
