//! # queuectl queue
//!
//! Persistent shell-job queue core.
//!
//! Features:
//! - `JobStore` trait with an atomic claim primitive
//! - Job state machine: pending → processing → completed | pending | dead
//! - Retry policy with optional backoff
//! - Independent polling workers and a fire-and-forget pool
//! - Dead-letter queue listing and requeue

pub mod backend;
pub mod dlq;
pub mod executor;
pub mod job;
pub mod memory;
pub mod retry;
pub mod worker;

pub use backend::{JobStore, QueueError};
pub use dlq::{DeadJob, DlqManager, DlqRetry};
pub use executor::{CommandExecutor, ExecutionMode, ExecutionResult, Executor};
pub use job::{Job, JobFilter, JobId, JobState, NewJob, StatusCounts};
pub use memory::MemoryJobStore;
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
pub use worker::{Tick, Worker, WorkerConfig, WorkerPool, WorkerPoolHandle};
