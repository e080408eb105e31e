//! DLQ command - Inspect and replay dead jobs
//!
//! Usage:
//! ```bash
//! queuectl dlq list
//! queuectl dlq retry <job-id>
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::sync::Arc;

use queuectl_queue::{DlqManager, DlqRetry};

use crate::config::StoreArgs;

/// Arguments for the dlq command
#[derive(Args)]
pub struct DlqArgs {
    #[command(subcommand)]
    command: DlqCommand,
}

#[derive(Subcommand)]
pub enum DlqCommand {
    /// List dead jobs
    #[command(name = "list")]
    List,

    /// Move a dead job back to pending with its attempts reset
    #[command(name = "retry")]
    Retry {
        /// Id of the dead job
        id: String,
    },
}

/// Run the dlq command
pub async fn run(store_args: &StoreArgs, args: DlqArgs) -> Result<()> {
    let dlq = DlqManager::new(Arc::new(store_args.open().await?));

    match args.command {
        DlqCommand::List => list(&dlq).await,
        DlqCommand::Retry { id } => retry(&dlq, &id).await,
    }
}

async fn list(dlq: &DlqManager) -> Result<()> {
    let dead = dlq.list().await?;
    if dead.is_empty() {
        crate::print_info("dead-letter queue is empty");
        return Ok(());
    }

    println!("{}", "Dead-letter queue".bold().red());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Command").fg(Color::Cyan),
            Cell::new("Attempts").fg(Color::Cyan),
            Cell::new("Last error").fg(Color::Cyan),
        ]);

    for job in &dead {
        let last_error = job
            .last_stderr
            .as_deref()
            .and_then(|s| s.lines().last())
            .unwrap_or("");
        table.add_row(vec![
            Cell::new(&job.id).fg(Color::Red),
            Cell::new(&job.command),
            Cell::new(job.attempts),
            Cell::new(last_error).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
    println!("Retry a job: {}", "queuectl dlq retry <id>".green());
    Ok(())
}

async fn retry(dlq: &DlqManager, id: &str) -> Result<()> {
    match dlq.retry(id).await? {
        DlqRetry::Requeued => crate::print_success(&format!("retried job {}", id)),
        DlqRetry::NotInDlq => crate::print_warning(&format!("job {} not found in DLQ", id)),
    }
    Ok(())
}
