//! Worker loop and pool

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::backend::{JobStore, QueueError};
use crate::executor::Executor;
use crate::job::{JobId, JobState};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Sleep between claim attempts while the queue is empty
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Result of one worker iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing was claimable
    Idle,
    /// A job was executed and left in `state`
    Processed { id: JobId, state: JobState },
}

/// A single polling loop: claim one job, run it, report, repeat.
pub struct Worker {
    id: usize,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn Executor>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        id: usize,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn Executor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            store,
            executor,
            config,
        }
    }

    /// Claim at most one job and carry it to its next state.
    pub async fn tick(&self) -> Result<Tick, QueueError> {
        let job = match self.store.claim_next().await? {
            Some(job) => job,
            None => return Ok(Tick::Idle),
        };

        info!(
            job_id = %job.id,
            attempt = job.attempts + 1,
            command = %job.command,
            "Executing job"
        );
        let result = self.executor.run(&job.command).await;

        let state = if result.is_success() {
            self.store.complete(&job.id, &result).await?;
            info!(job_id = %job.id, "Job completed");
            JobState::Completed
        } else {
            let updated = self.store.fail_attempt(&job.id, &result).await?;
            match updated.state {
                JobState::Dead => warn!(
                    job_id = %job.id,
                    attempts = updated.attempts,
                    exit_code = ?result.exit_code,
                    "Job moved to DLQ"
                ),
                _ => info!(
                    job_id = %job.id,
                    attempts = updated.attempts,
                    max_retries = updated.max_retries,
                    exit_code = ?result.exit_code,
                    eligible_at = ?updated.next_eligible_at,
                    "Job failed, scheduling retry"
                ),
            }
            updated.state
        };

        Ok(Tick::Processed { id: job.id, state })
    }

    /// Poll forever. Store errors are logged and retried on the next cycle.
    pub async fn run(self) {
        let span = info_span!("worker", worker = self.id);
        async move {
            info!("Worker started");
            loop {
                match self.tick().await {
                    Ok(Tick::Processed { .. }) => {}
                    Ok(Tick::Idle) => {
                        debug!("Queue empty");
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Queue error");
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Launches independent workers that coordinate only through the store.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn Executor>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn Executor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Spawn `count` workers and return without waiting for them.
    pub fn start(&self, count: usize) -> Result<WorkerPoolHandle, QueueError> {
        if count == 0 {
            return Err(QueueError::Validation("worker count must be at least 1".into()));
        }

        let handles = (0..count)
            .map(|id| {
                let worker =
                    Worker::new(id, self.store.clone(), self.executor.clone(), self.config);
                tokio::spawn(worker.run())
            })
            .collect();

        info!(count, poll_interval = ?self.config.poll_interval, "Worker pool started");

        Ok(WorkerPoolHandle { handles })
    }
}

/// Handles to running workers
#[derive(Debug)]
pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every worker at its next await point. A command still running is
    /// killed and its job stays in processing.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Wait for all workers to finish (after `abort`, or never).
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!(error = %e, "Worker task panicked");
                }
            }
        }
    }
}
