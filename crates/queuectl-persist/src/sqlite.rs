//! SQLite connection setup

use queuectl_queue::QueueError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g., "sqlite:queuectl.db?mode=rwc" or "sqlite::memory:")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Enable WAL journal mode so readers do not block the claiming writer
    pub wal_mode: bool,
    /// How long a writer waits on a locked database, in seconds
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:queuectl.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    /// Create config for a database file, created if missing
    pub fn file(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            ..Default::default()
        }
    }

    /// Create config for in-memory database (testing)
    ///
    /// Every connection to `sqlite::memory:` sees its own database, so the
    /// pool is pinned to one long-lived connection.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            busy_timeout_secs: 5,
        }
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

/// Open a pool and bring the schema up to date.
pub async fn connect(config: &SqliteConfig) -> Result<SqlitePool, QueueError> {
    let mut options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| QueueError::Backend(format!("invalid database url: {}", e)))?;

    // SQLite reads the pragma as a 32-bit millisecond count
    let busy_timeout_ms = (u64::from(config.busy_timeout_secs) * 1000).min(i32::MAX as u64);
    options = options.pragma("busy_timeout", busy_timeout_ms.to_string());

    if config.wal_mode {
        options = options.pragma("journal_mode", "WAL");
    }

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.is_memory() {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| QueueError::Backend(format!("connection failed: {}", e)))?;

    info!(url = %config.url, wal = config.wal_mode, "Connected to SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| QueueError::Backend(format!("Migration failed: {}", e)))?;

    Ok(pool)
}
