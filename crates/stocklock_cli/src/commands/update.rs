//! Update command implementation.
//!
//! Every caller rewrites the whole record with its own values.

use super::{
    run_callers, seed_inventory, seed_product, BackendArg, CommandResult, OutputFormat,
    RunReport, StrategyArg,
};
use std::time::Duration;
use stocklock_core::{ConcurrencyControlledStore, IdOf, PatchOf, StoreConfig, Strategy};
use stocklock_storage::{InventoryPatch, ProductPatch, StorageAdapter};
use tracing::info;

/// Options for the update command.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Backend to seed.
    pub backend: BackendArg,
    /// Strategy every caller uses.
    pub strategy: StrategyArg,
    /// Number of concurrent callers.
    pub callers: usize,
    /// Simulated work between read and write.
    pub delay: Duration,
    /// Lock wait for pessimistic callers.
    pub lock_timeout: Option<Duration>,
}

/// Runs the update command.
pub fn run(options: &UpdateOptions, format: OutputFormat) -> CommandResult {
    info!(
        backend = ?options.backend,
        strategy = ?options.strategy,
        callers = options.callers,
        "starting concurrent updates"
    );
    let mut config = StoreConfig::new().processing_delay(options.delay);
    if let Some(timeout) = options.lock_timeout {
        config = config.lock_timeout(timeout);
    }

    let report = match options.backend {
        BackendArg::Relational => {
            let (store, id) = seed_product(10, config)?;
            update(&store, &id, options, product_patch)?
        }
        BackendArg::Document => {
            let (store, id) = seed_inventory(10, config)?;
            update(&store, &id, options, inventory_patch)?
        }
    };
    report.emit(format)
}

fn product_patch(caller: usize) -> ProductPatch {
    ProductPatch::new()
        .name(format!("Laptop rev {caller}"))
        .description(format!("written by caller {caller}"))
        .price(999.0 + caller as f64)
        .stock(100 + caller as u32)
}

fn inventory_patch(caller: usize) -> InventoryPatch {
    InventoryPatch::new()
        .item_name(format!("Widget rev {caller}"))
        .category(format!("batch-{caller}"))
        .price(2.5 + caller as f64)
        .quantity(100 + caller as u32)
}

fn update<A: StorageAdapter + 'static>(
    store: &ConcurrencyControlledStore<A>,
    id: &IdOf<A>,
    options: &UpdateOptions,
    make_patch: fn(usize) -> PatchOf<A>,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let strategy = Strategy::from(options.strategy);
    run_callers("update", strategy, store, id, options.callers, move |store, id, caller| {
        let patch = make_patch(caller);
        match strategy {
            Strategy::Optimistic => store.update_optimistic(id, &patch),
            Strategy::Pessimistic => store.update_pessimistic(id, &patch),
        }
    })
}
