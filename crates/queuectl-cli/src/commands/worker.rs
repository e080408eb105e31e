//! Worker command - Run a pool of workers in the foreground
//!
//! Usage:
//! ```bash
//! queuectl worker start --count 4
//! queuectl worker start --backoff-secs 2 --timeout-secs 600
//! ```

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use queuectl_queue::WorkerPool;

use crate::config::{StoreArgs, WorkerArgs};

/// Arguments for the worker command
#[derive(Args)]
pub struct WorkerCommandArgs {
    #[command(subcommand)]
    command: WorkerCommand,
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Start workers and run until interrupted
    #[command(name = "start")]
    Start {
        /// Number of workers
        #[arg(long, short = 'c', default_value_t = 1)]
        count: usize,

        #[command(flatten)]
        tuning: WorkerArgs,
    },
}

/// Run the worker command
pub async fn run(store_args: &StoreArgs, args: WorkerCommandArgs) -> Result<()> {
    match args.command {
        WorkerCommand::Start { count, tuning } => start(store_args, count, tuning).await,
    }
}

async fn start(store_args: &StoreArgs, count: usize, tuning: WorkerArgs) -> Result<()> {
    let store = store_args.open().await?.with_policy(tuning.retry_policy());

    if tuning.timeout_secs.is_none() {
        info!("No command timeout set: a hanging command occupies its worker until it exits");
    }

    let pool = WorkerPool::new(Arc::new(store), tuning.executor(), tuning.worker_config());
    let handle = pool.start(count)?;
    crate::print_success(&format!("started {} worker(s), Ctrl-C to stop", handle.len()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    warn!("Interrupted, stopping workers");
    handle.abort();
    handle.join().await;
    Ok(())
}
