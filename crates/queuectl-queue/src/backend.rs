//! Job Store Trait

use crate::executor::ExecutionResult;
use crate::job::{Job, JobFilter, NewJob, StatusCounts};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable job storage.
///
/// Workers coordinate only through this trait: `claim_next` is the single
/// operation that must be atomic across concurrent callers. Every other
/// transition touches one row owned by one writer.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job, resetting it to pending with zero attempts.
    /// Nothing is written if validation fails.
    async fn enqueue(&self, job: NewJob) -> Result<Job, QueueError>;

    /// Atomically move the oldest claimable pending job to processing
    /// (ties on `created_at` broken by `id` ascending).
    async fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// Record a successful run of a processing job.
    async fn complete(&self, id: &str, result: &ExecutionResult) -> Result<(), QueueError>;

    /// Record a failed run of a processing job: bump `attempts` and let the
    /// retry policy pick pending or dead. Returns the updated record.
    async fn fail_attempt(&self, id: &str, result: &ExecutionResult) -> Result<Job, QueueError>;

    /// Snapshot of matching jobs, oldest first.
    async fn query(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError>;

    /// Number of jobs per state.
    async fn status_counts(&self) -> Result<StatusCounts, QueueError>;

    /// Move a dead job back to pending with `attempts = 0`.
    /// `NotFound` if the id is absent or not dead.
    async fn requeue_from_dlq(&self, id: &str) -> Result<Job, QueueError>;
}
