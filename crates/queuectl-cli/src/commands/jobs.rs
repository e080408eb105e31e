//! Read-only commands: list, show, status

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use queuectl_queue::{Job, JobFilter, JobState, JobStore, StatusCounts};

use crate::config::StoreArgs;

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Only show jobs in this state (pending, processing, completed, dead)
    #[arg(long, short = 's')]
    state: Option<JobState>,
}

/// Arguments for the show command
#[derive(Args)]
pub struct ShowArgs {
    /// Job id
    id: String,
}

fn state_color(state: JobState) -> Color {
    match state {
        JobState::Pending => Color::Yellow,
        JobState::Processing => Color::Blue,
        JobState::Completed => Color::Green,
        JobState::Dead => Color::Red,
    }
}

fn jobs_table(jobs: &[Job]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
            Cell::new("Attempts").fg(Color::Cyan),
            Cell::new("Command").fg(Color::Cyan),
        ]);

    for job in jobs {
        table.add_row(vec![
            Cell::new(&job.id).fg(Color::Green),
            Cell::new(job.state).fg(state_color(job.state)),
            Cell::new(format!("{}/{}", job.attempts, job.max_retries + 1)),
            Cell::new(&job.command),
        ]);
    }
    table
}

/// Run the list command
pub async fn list(store_args: &StoreArgs, args: ListArgs) -> Result<()> {
    let store = store_args.open().await?;
    let filter = args.state.map_or(JobFilter::All, JobFilter::State);
    let jobs = store.query(filter).await?;

    if jobs.is_empty() {
        crate::print_info("no jobs");
        return Ok(());
    }

    println!("{}", jobs_table(&jobs));
    Ok(())
}

/// Run the show command
pub async fn show(store_args: &StoreArgs, args: ShowArgs) -> Result<()> {
    let store = store_args.open().await?;
    let job = store
        .query(JobFilter::Id(args.id.clone()))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Job '{}' not found", args.id))?;

    println!("{} {}", "Job".bold().cyan(), job.id.bold());
    println!("{}", "═".repeat(40).cyan());
    println!("  {} {}", "Command:".dimmed(), job.command);
    println!("  {} {}", "State:".dimmed(), job.state);
    println!("  {} {} (max retries {})", "Attempts:".dimmed(), job.attempts, job.max_retries);
    println!("  {} {}", "Created:".dimmed(), job.created_at.to_rfc3339());
    println!("  {} {}", "Updated:".dimmed(), job.updated_at.to_rfc3339());
    if let Some(at) = job.next_eligible_at {
        println!("  {} {}", "Retry after:".dimmed(), at.to_rfc3339());
    }
    if let Some(code) = job.last_exit_code {
        println!("  {} {}", "Exit code:".dimmed(), code);
    }
    for (label, output) in [("stdout", &job.last_stdout), ("stderr", &job.last_stderr)] {
        if let Some(text) = output.as_deref().filter(|t| !t.trim().is_empty()) {
            println!();
            println!("{}", format!("Last {}:", label).bold());
            println!("{}", text.trim_end());
        }
    }

    Ok(())
}

fn status_lines(counts: &StatusCounts) -> Vec<String> {
    JobState::ALL
        .iter()
        .map(|state| format!("{:<11} {}", state.as_str(), counts.get(*state)))
        .collect()
}

/// Run the status command
pub async fn status(store_args: &StoreArgs) -> Result<()> {
    let store = store_args.open().await?;
    let counts = store.status_counts().await?;

    println!("{}", "Job status".bold().cyan());
    for line in status_lines(&counts) {
        println!("  {}", line);
    }
    println!("  {:<11} {}", "total".dimmed(), counts.total());
    Ok(())
}
