//! Enqueue command - Add a job from a JSON descriptor
//!
//! Usage:
//! ```bash
//! queuectl enqueue --file job.json
//! queuectl enqueue --json '{"id": "j1", "command": "sleep 1"}'
//! ```
//!
//! Descriptor fields: `id` (required), `command` (required, run through the
//! shell unless workers use `--direct`), `max_retries` (default 3).

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use queuectl_queue::{JobFilter, JobStore, NewJob};

use crate::config::StoreArgs;

/// Arguments for the enqueue command
#[derive(Args)]
pub struct EnqueueArgs {
    /// Path to a JSON job descriptor
    #[arg(long, short = 'f', value_name = "FILE", conflicts_with = "json")]
    file: Option<PathBuf>,

    /// Inline JSON job descriptor
    #[arg(long, value_name = "JSON")]
    json: Option<String>,
}

fn read_descriptor(args: &EnqueueArgs) -> Result<NewJob> {
    let content = match (&args.file, &args.json) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?,
        (None, Some(json)) => json.clone(),
        (None, None) => anyhow::bail!("please specify --file job.json or --json <descriptor>"),
    };

    NewJob::from_json(&content).context("Failed to parse job descriptor")
}

/// Run the enqueue command
pub async fn run(store_args: &StoreArgs, args: EnqueueArgs) -> Result<()> {
    let new_job = read_descriptor(&args)?;
    let store = store_args.open().await?;

    let existing = store.query(JobFilter::Id(new_job.id.trim().to_string())).await?;
    if let Some(previous) = existing.first() {
        crate::print_warning(&format!(
            "replacing job {} (was {}, {} attempts)",
            previous.id, previous.state, previous.attempts
        ));
    }

    let job = store.enqueue(new_job).await.context("Enqueue rejected")?;
    crate::print_success(&format!("enqueued job {}", job.id));

    Ok(())
}
