//! queuectl - persistent shell job queue
//!
//! # Usage
//!
//! ```bash
//! # Queue a job (re-using an id REPLACES that job and its progress)
//! queuectl enqueue --file job.json
//! queuectl enqueue --json '{"id": "j1", "command": "echo hi", "max_retries": 2}'
//!
//! # Inspect
//! queuectl list --state pending
//! queuectl show j1
//! queuectl status
//!
//! # Run three workers until Ctrl-C
//! queuectl worker start --count 3
//!
//! # Dead-letter queue
//! queuectl dlq list
//! queuectl dlq retry j1
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod config;

use commands::{dlq, enqueue, jobs, worker};
use config::StoreArgs;

/// queuectl - persistent job queue with retries and a dead-letter queue
#[derive(Parser)]
#[command(
    name = "queuectl",
    version,
    about = "Persistent shell job queue with retries and a dead-letter queue",
    long_about = "queuectl stores shell jobs in SQLite and runs them on a pool of workers.\n\n\
                  Failed jobs are retried up to max_retries times, then moved to the\n\
                  dead-letter queue where they can be inspected and retried."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a job, replacing any job with the same id
    #[command(name = "enqueue")]
    Enqueue(enqueue::EnqueueArgs),

    /// List jobs in creation order
    #[command(name = "list")]
    List(jobs::ListArgs),

    /// Show one job including its last output
    #[command(name = "show")]
    Show(jobs::ShowArgs),

    /// Count jobs per state
    #[command(name = "status")]
    Status,

    /// Run workers
    #[command(name = "worker")]
    Worker(worker::WorkerCommandArgs),

    /// Inspect and replay the dead-letter queue
    #[command(name = "dlq")]
    Dlq(dlq::DlqArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Workers report progress through the log
    let floor = if matches!(cli.command, Commands::Worker(_)) { 1 } else { 0 };
    setup_logging(cli.verbose.max(floor));

    match cli.command {
        Commands::Enqueue(args) => enqueue::run(&cli.store, args).await,
        Commands::List(args) => jobs::list(&cli.store, args).await,
        Commands::Show(args) => jobs::show(&cli.store, args).await,
        Commands::Status => jobs::status(&cli.store).await,
        Commands::Worker(args) => worker::run(&cli.store, args).await,
        Commands::Dlq(args) => dlq::run(&cli.store, args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
