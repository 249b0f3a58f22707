//! StockLock CLI
//!
//! Command-line demonstrations of optimistic and pessimistic concurrency
//! control against the StockLock backends.
//!
//! # Commands
//!
//! - `race` - Concurrent quantity decreases on one record
//! - `update` - Concurrent full updates on one record
//! - `lock-timeout` - A deadlined acquire behind a long-running holder

mod commands;

use clap::{Parser, Subcommand};
use commands::{BackendArg, OutputFormat, StrategyArg};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// StockLock concurrency control demonstrations.
#[derive(Parser)]
#[command(name = "stocklock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Race concurrent callers decreasing the same record
    Race {
        /// Backend to seed
        #[arg(short, long, value_enum, default_value = "relational")]
        backend: BackendArg,

        /// Concurrency control strategy
        #[arg(short, long, value_enum, default_value = "optimistic")]
        strategy: StrategyArg,

        /// Number of concurrent callers
        #[arg(
            short = 'n',
            long,
            default_value = "2",
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        callers: u16,

        /// Starting quantity
        #[arg(short, long, default_value = "1")]
        quantity: u32,

        /// Units each caller removes
        #[arg(short, long, default_value = "1")]
        amount: u32,

        /// Simulated work between read and write, in milliseconds
        #[arg(long, default_value = "50")]
        delay_ms: u64,

        /// Lock wait for pessimistic callers, in milliseconds (waits forever if unset)
        #[arg(long)]
        lock_timeout_ms: Option<u64>,
    },

    /// Run concurrent full updates of the same record
    Update {
        /// Backend to seed
        #[arg(short, long, value_enum, default_value = "relational")]
        backend: BackendArg,

        /// Concurrency control strategy
        #[arg(short, long, value_enum, default_value = "optimistic")]
        strategy: StrategyArg,

        /// Number of concurrent callers
        #[arg(
            short = 'n',
            long,
            default_value = "4",
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        callers: u16,

        /// Simulated work between read and write, in milliseconds
        #[arg(long, default_value = "50")]
        delay_ms: u64,

        /// Lock wait for pessimistic callers, in milliseconds (waits forever if unset)
        #[arg(long)]
        lock_timeout_ms: Option<u64>,
    },

    /// Attempt a deadlined exclusive acquire while another caller holds the record
    LockTimeout {
        /// Backend to seed
        #[arg(short, long, value_enum, default_value = "relational")]
        backend: BackendArg,

        /// How long the holder keeps the record, in milliseconds
        #[arg(long, default_value = "500")]
        hold_ms: u64,

        /// Deadline for the contender, in milliseconds
        #[arg(long, default_value = "100")]
        timeout_ms: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Race {
            backend,
            strategy,
            callers,
            quantity,
            amount,
            delay_ms,
            lock_timeout_ms,
        } => {
            let options = commands::race::RaceOptions {
                backend,
                strategy,
                callers: usize::from(callers),
                quantity,
                amount,
                delay: Duration::from_millis(delay_ms),
                lock_timeout: lock_timeout_ms.map(Duration::from_millis),
            };
            commands::race::run(&options, cli.format)?;
        }
        Commands::Update {
            backend,
            strategy,
            callers,
            delay_ms,
            lock_timeout_ms,
        } => {
            let options = commands::update::UpdateOptions {
                backend,
                strategy,
                callers: usize::from(callers),
                delay: Duration::from_millis(delay_ms),
                lock_timeout: lock_timeout_ms.map(Duration::from_millis),
            };
            commands::update::run(&options, cli.format)?;
        }
        Commands::LockTimeout {
            backend,
            hold_ms,
            timeout_ms,
        } => {
            commands::lock_timeout::run(
                backend,
                Duration::from_millis(hold_ms),
                Duration::from_millis(timeout_ms),
                cli.format,
            )?;
        }
        Commands::Version => {
            println!("StockLock CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("StockLock Core v{}", stocklock_core::VERSION);
        }
    }

    Ok(())
}
