//! Job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::backend::QueueError;

/// Job Identifier (caller supplied, natural key)
pub type JobId = String;

/// Retries allowed when the descriptor does not say otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Command exited with status 0
    Completed,
    /// Retries exhausted, parked in the DLQ
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(QueueError::Validation(format!("unknown job state '{}'", other))),
        }
    }
}

/// Job descriptor accepted by `enqueue`.
///
/// Enqueueing an `id` that already exists **replaces** the stored record:
/// its state goes back to pending and its attempt count to zero, whatever
/// progress it had made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub id: JobId,
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl NewJob {
    pub fn new(id: impl Into<JobId>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Parse a JSON job descriptor.
    pub fn from_json(input: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Check required fields. Returns a trimmed copy ready to be written.
    pub fn validate(&self) -> Result<NewJob, QueueError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(QueueError::Validation("job 'id' is required".into()));
        }
        let command = self.command.trim();
        if command.is_empty() {
            return Err(QueueError::Validation(format!(
                "job '{}' is missing a 'command'",
                id
            )));
        }
        Ok(NewJob {
            id: id.to_string(),
            command: command.to_string(),
            max_retries: self.max_retries,
        })
    }

    /// Build the fresh pending record written by an enqueue.
    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        Job {
            id: self.id,
            command: self.command,
            state: JobState::Pending,
            attempts: 0,
            max_retries: self.max_retries,
            created_at: now,
            updated_at: now,
            next_eligible_at: None,
            last_exit_code: None,
            last_stdout: None,
            last_stderr: None,
        }
    }
}

/// A persisted job record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time a pending job may be claimed again (retry backoff)
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub last_exit_code: Option<i32>,
    pub last_stdout: Option<String>,
    pub last_stderr: Option<String>,
}

impl Job {
    /// Whether a worker may claim this job at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_eligible_at.map_or(true, |at| at <= now)
    }
}

/// Read-only selection for `JobStore::query`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobFilter {
    #[default]
    All,
    State(JobState),
    Id(JobId),
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        match self {
            Self::All => true,
            Self::State(state) => job.state == *state,
            Self::Id(id) => job.id == *id,
        }
    }
}

/// Number of jobs in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub dead: u64,
}

impl StatusCounts {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Dead => self.dead,
        }
    }

    pub fn add(&mut self, state: JobState, n: u64) {
        match state {
            JobState::Pending => self.pending += n,
            JobState::Processing => self.processing += n,
            JobState::Completed => self.completed += n,
            JobState::Dead => self.dead += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_max_retries() {
        let job = NewJob::from_json(r#"{"id": "j1", "command": "echo hi"}"#).unwrap();
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let missing_id = NewJob::from_json(r#"{"command": "true"}"#).unwrap();
        assert!(matches!(
            missing_id.validate(),
            Err(QueueError::Validation(_))
        ));

        let blank_command = NewJob::new("j1", "   ");
        let err = blank_command.validate().unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in JobState::ALL {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("failed".parse::<JobState>().is_err());
    }

    #[test]
    fn test_claimable_respects_eligibility() {
        let now = Utc::now();
        let mut job = NewJob::new("j1", "true").into_job(now);
        assert!(job.is_claimable(now));

        job.next_eligible_at = Some(now + chrono::Duration::seconds(5));
        assert!(!job.is_claimable(now));

        job.next_eligible_at = None;
        job.state = JobState::Processing;
        assert!(!job.is_claimable(now));
    }
}
