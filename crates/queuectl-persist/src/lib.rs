//! # queuectl persistence
//!
//! SQLite-backed `JobStore`. The database location is always passed in
//! through `SqliteConfig`; there is no global connection.

pub mod queue;
pub mod sqlite;

pub use queue::SqliteJobStore;
pub use sqlite::{connect, SqliteConfig};
