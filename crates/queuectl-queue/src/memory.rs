//! In-memory job store
//!
//! Every mutation runs under one write lock, so a claim is a single
//! check-and-set against the job map.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::{JobStore, QueueError};
use crate::executor::ExecutionResult;
use crate::job::{Job, JobFilter, JobState, NewJob, StatusCounts};
use crate::retry::RetryPolicy;

#[derive(Debug, Default, Clone)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    policy: RetryPolicy,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            jobs: Arc::default(),
            policy,
        }
    }

    fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }
}

fn processing<'a>(jobs: &'a mut HashMap<String, Job>, id: &str) -> Result<&'a mut Job, QueueError> {
    jobs.get_mut(id)
        .filter(|job| job.state == JobState::Processing)
        .ok_or_else(|| QueueError::NotFound(format!("no processing job '{}'", id)))
}

fn record_output(job: &mut Job, result: &ExecutionResult) {
    job.last_exit_code = Some(result.recorded_exit_code());
    job.last_stdout = Some(result.stdout.clone());
    job.last_stderr = Some(result.recorded_stderr());
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<Job, QueueError> {
        let job = job.validate()?.into_job(Utc::now());
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();

        let next = jobs
            .values()
            .filter(|job| job.is_claimable(now))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|job| job.id.clone());

        Ok(next.and_then(|id| {
            let job = jobs.get_mut(&id)?;
            job.state = JobState::Processing;
            job.updated_at = now;
            Some(job.clone())
        }))
    }

    async fn complete(&self, id: &str, result: &ExecutionResult) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = processing(&mut jobs, id)?;
        job.state = JobState::Completed;
        job.updated_at = Utc::now();
        record_output(job, result);
        Ok(())
    }

    async fn fail_attempt(&self, id: &str, result: &ExecutionResult) -> Result<Job, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = processing(&mut jobs, id)?;
        let now = Utc::now();

        job.attempts = job.attempts.saturating_add(1);
        let decision = self.policy.on_failure(job.attempts, job.max_retries, now);
        job.state = decision.state();
        job.next_eligible_at = decision.eligible_at();
        job.updated_at = now;
        record_output(job, result);

        Ok(job.clone())
    }

    async fn query(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.read().await;
        Ok(Self::sorted(
            jobs.values().filter(|job| filter.matches(job)).cloned().collect(),
        ))
    }

    async fn status_counts(&self) -> Result<StatusCounts, QueueError> {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }

    async fn requeue_from_dlq(&self, id: &str) -> Result<Job, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .filter(|job| job.state == JobState::Dead)
            .ok_or_else(|| QueueError::NotFound(format!("no dead job '{}'", id)))?;

        job.state = JobState::Pending;
        job.attempts = 0;
        job.next_eligible_at = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}
