//! Dead-letter queue

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::backend::{JobStore, QueueError};
use crate::job::{JobFilter, JobId, JobState};

/// A dead job as shown to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadJob {
    pub id: JobId,
    pub command: String,
    pub attempts: u32,
    pub last_stderr: Option<String>,
}

/// Outcome of a DLQ retry request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqRetry {
    Requeued,
    /// The id is unknown or the job is not dead; nothing changed
    NotInDlq,
}

pub struct DlqManager {
    store: Arc<dyn JobStore>,
}

impl DlqManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<DeadJob>, QueueError> {
        let jobs = self.store.query(JobFilter::State(JobState::Dead)).await?;
        Ok(jobs
            .into_iter()
            .map(|job| DeadJob {
                id: job.id,
                command: job.command,
                attempts: job.attempts,
                last_stderr: job.last_stderr,
            })
            .collect())
    }

    pub async fn retry(&self, id: &str) -> Result<DlqRetry, QueueError> {
        match self.store.requeue_from_dlq(id).await {
            Ok(_) => {
                info!(job_id = %id, "Job requeued from DLQ");
                Ok(DlqRetry::Requeued)
            }
            Err(QueueError::NotFound(_)) => Ok(DlqRetry::NotInDlq),
            Err(e) => Err(e),
        }
    }
}
