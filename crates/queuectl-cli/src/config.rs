//! Runtime configuration assembled from flags and environment

use clap::Args;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use queuectl_persist::{SqliteConfig, SqliteJobStore};
use queuectl_queue::{BackoffStrategy, CommandExecutor, ExecutionMode, RetryPolicy, WorkerConfig};

/// Where the queue lives
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite database URL or file path
    #[arg(
        long,
        global = true,
        env = "QUEUECTL_DB",
        default_value = "sqlite:queuectl.db?mode=rwc",
        value_name = "URL"
    )]
    pub db: String,
}

impl StoreArgs {
    pub fn sqlite_config(&self) -> SqliteConfig {
        let url = if self.db.starts_with("sqlite:") {
            self.db.clone()
        } else {
            format!("sqlite:{}?mode=rwc", self.db)
        };
        SqliteConfig {
            url,
            ..Default::default()
        }
    }

    pub async fn open(&self) -> Result<SqliteJobStore> {
        let config = self.sqlite_config();
        SqliteJobStore::open(&config)
            .await
            .with_context(|| format!("Failed to open job store at {}", config.url))
    }
}

/// Worker tuning
#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    /// Sleep between polls of an empty queue
    #[arg(long, env = "QUEUECTL_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Enable exponential retry backoff starting at this many seconds
    #[arg(long, env = "QUEUECTL_BACKOFF_SECS")]
    pub backoff_secs: Option<u64>,

    /// Upper bound for a single backoff delay
    #[arg(long, env = "QUEUECTL_BACKOFF_MAX_SECS", requires = "backoff_secs")]
    pub backoff_max_secs: Option<u64>,

    /// Kill commands running longer than this (default: no limit)
    #[arg(long, env = "QUEUECTL_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Run commands as a plain argument vector instead of through the shell
    #[arg(long)]
    pub direct: bool,
}

impl WorkerArgs {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.backoff_secs {
            Some(initial_secs) => RetryPolicy::with_backoff(BackoffStrategy::Exponential {
                initial_secs,
                multiplier: 2.0,
                max_secs: self.backoff_max_secs,
            }),
            None => RetryPolicy::immediate(),
        }
    }

    pub fn executor(&self) -> Arc<CommandExecutor> {
        let mode = if self.direct {
            ExecutionMode::Direct
        } else {
            ExecutionMode::Shell
        };
        Arc::new(
            CommandExecutor::new(mode).with_timeout(self.timeout_secs.map(Duration::from_secs)),
        )
    }
}
