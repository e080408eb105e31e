use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use queuectl_queue::{
    ExecutionResult, Job, JobFilter, JobState, JobStore, NewJob, QueueError, RetryPolicy,
    StatusCounts,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::sqlite::{connect, SqliteConfig};

const JOB_COLUMNS: &str = "id, command, state, attempts, max_retries, created_at, updated_at, \
                           next_eligible_at, last_exit_code, last_stdout, last_stderr";

/// Durable job store using SQLite
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    policy: RetryPolicy,
}

impl SqliteJobStore {
    /// Wrap an existing pool. The `jobs` table must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            policy: RetryPolicy::default(),
        }
    }

    /// Connect, migrate and wrap the resulting pool.
    pub async fn open(config: &SqliteConfig) -> Result<Self, QueueError> {
        Ok(Self::new(connect(config).await?))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}

/// Fixed-width so that SQL text comparison matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| QueueError::Backend(format!("invalid timestamp '{}': {}", value, e)))
}

fn count(value: i64, column: &str) -> Result<u32, QueueError> {
    u32::try_from(value)
        .map_err(|_| QueueError::Backend(format!("invalid {} in DB: {}", column, value)))
}

fn row_to_job(row: &SqliteRow) -> Result<Job, QueueError> {
    let state: String = row.try_get("state").map_err(backend)?;
    let created_at: String = row.try_get("created_at").map_err(backend)?;
    let updated_at: String = row.try_get("updated_at").map_err(backend)?;
    let next_eligible_at: Option<String> = row.try_get("next_eligible_at").map_err(backend)?;
    let last_exit_code: Option<i64> = row.try_get("last_exit_code").map_err(backend)?;

    Ok(Job {
        id: row.try_get("id").map_err(backend)?,
        command: row.try_get("command").map_err(backend)?,
        state: state
            .parse()
            .map_err(|_| QueueError::Backend(format!("Invalid state in DB: {}", state)))?,
        attempts: count(row.try_get("attempts").map_err(backend)?, "attempts")?,
        max_retries: count(row.try_get("max_retries").map_err(backend)?, "max_retries")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        next_eligible_at: next_eligible_at.as_deref().map(parse_timestamp).transpose()?,
        last_exit_code: last_exit_code.map(|code| code as i32),
        last_stdout: row.try_get("last_stdout").map_err(backend)?,
        last_stderr: row.try_get("last_stderr").map_err(backend)?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<Job, QueueError> {
        let job = job.validate()?.into_job(Utc::now());
        let now = timestamp(job.created_at);

        // Whole-row replace: progress of an existing id is discarded
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO jobs
                (id, command, state, attempts, max_retries, created_at, updated_at)
            VALUES (?, ?, 'pending', 0, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(i64::from(job.max_retries))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!(job_id = %job.id, "Enqueued job");
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let now = timestamp(Utc::now());

        // One statement: SQLite holds the write lock across the sub-select and
        // the update, and the outer state check makes it a compare-and-swap.
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET state = 'processing', updated_at = ?
            WHERE state = 'pending'
              AND id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                  AND (next_eligible_at IS NULL OR next_eligible_at <= ?)
                ORDER BY created_at ASC, id ASC
                LIMIT 1
              )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn complete(&self, id: &str, result: &ExecutionResult) -> Result<(), QueueError> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed', updated_at = ?,
                last_exit_code = ?, last_stdout = ?, last_stderr = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(timestamp(Utc::now()))
        .bind(i64::from(result.recorded_exit_code()))
        .bind(&result.stdout)
        .bind(result.recorded_stderr())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            return Err(QueueError::NotFound(format!("no processing job '{}'", id)));
        }
        Ok(())
    }

    async fn fail_attempt(&self, id: &str, result: &ExecutionResult) -> Result<Job, QueueError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Write first so the transaction holds the write lock from the start
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1, updated_at = ?,
                last_exit_code = ?, last_stdout = ?, last_stderr = ?
            WHERE id = ? AND state = 'processing'
            RETURNING attempts, max_retries
            "#,
        )
        .bind(timestamp(now))
        .bind(i64::from(result.recorded_exit_code()))
        .bind(&result.stdout)
        .bind(result.recorded_stderr())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| QueueError::NotFound(format!("no processing job '{}'", id)))?;

        let attempts = count(row.try_get("attempts").map_err(backend)?, "attempts")?;
        let max_retries = count(row.try_get("max_retries").map_err(backend)?, "max_retries")?;
        let decision = self.policy.on_failure(attempts, max_retries, now);

        let row = sqlx::query(&format!(
            "UPDATE jobs SET state = ?, next_eligible_at = ? WHERE id = ? RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(decision.state().as_str())
        .bind(decision.eligible_at().map(timestamp))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        let job = row_to_job(&row)?;
        tx.commit().await.map_err(backend)?;
        Ok(job)
    }

    async fn query(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        let base = format!("SELECT {} FROM jobs", JOB_COLUMNS);
        let order = "ORDER BY created_at ASC, id ASC";

        let rows = match filter {
            JobFilter::All => sqlx::query(&format!("{} {}", base, order))
                .fetch_all(&self.pool)
                .await,
            JobFilter::State(state) => {
                sqlx::query(&format!("{} WHERE state = ? {}", base, order))
                    .bind(state.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            JobFilter::Id(id) => sqlx::query(&format!("{} WHERE id = ?", base))
                .bind(id)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(backend)?;

        rows.iter().map(row_to_job).collect()
    }

    async fn status_counts(&self) -> Result<StatusCounts, QueueError> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let state: String = row.try_get("state").map_err(backend)?;
            let n: i64 = row.try_get("n").map_err(backend)?;
            let state: JobState = state
                .parse()
                .map_err(|_| QueueError::Backend(format!("Invalid state in DB: {}", state)))?;
            counts.add(state, n.max(0) as u64);
        }
        Ok(counts)
    }

    async fn requeue_from_dlq(&self, id: &str) -> Result<Job, QueueError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = 0, next_eligible_at = NULL, updated_at = ?
            WHERE id = ? AND state = 'dead'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(timestamp(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| QueueError::NotFound(format!("no dead job '{}'", id)))?;

        row_to_job(&row)
    }
}
