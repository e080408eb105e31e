//! Worker, pool and DLQ behaviour against the in-memory store

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use queuectl_queue::{
    DlqManager, DlqRetry, ExecutionResult, Executor, JobFilter, JobState, JobStore,
    MemoryJobStore, NewJob, Tick, Worker, WorkerConfig, WorkerPool,
};

/// Interprets `exit <n>` itself and counts invocations
#[derive(Debug, Default)]
struct ScriptedExecutor {
    runs: AtomicU32,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(&self, command: &str) -> ExecutionResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match command.strip_prefix("exit ").and_then(|c| c.trim().parse::<i32>().ok()) {
            Some(code) => ExecutionResult::exited(code, "", format!("exited {}", code)),
            None => ExecutionResult::launch_failed(format!("cannot run '{}'", command)),
        }
    }
}

/// Fails every command until told to succeed
#[derive(Debug, Default)]
struct SwitchExecutor {
    succeed: AtomicBool,
}

#[async_trait]
impl Executor for SwitchExecutor {
    async fn run(&self, _command: &str) -> ExecutionResult {
        if self.succeed.load(Ordering::SeqCst) {
            ExecutionResult::exited(0, "ok", "")
        } else {
            ExecutionResult::exited(1, "", "broken")
        }
    }
}

fn setup() -> (Arc<MemoryJobStore>, Arc<ScriptedExecutor>, Worker) {
    let store = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(ScriptedExecutor::default());
    let worker = Worker::new(0, store.clone(), executor.clone(), WorkerConfig::default());
    (store, executor, worker)
}

async fn job_state(store: &MemoryJobStore, id: &str) -> (JobState, u32) {
    let jobs = store.query(JobFilter::Id(id.to_string())).await.unwrap();
    (jobs[0].state, jobs[0].attempts)
}

#[tokio::test]
async fn test_worker_config_defaults() {
    let config = WorkerConfig::default();
    assert_eq!(config.poll_interval, Duration::from_secs(1));
}

#[tokio::test]
async fn test_successful_job_completes() {
    let (store, _, worker) = setup();
    store
        .enqueue(NewJob::new("j1", "exit 0").with_max_retries(3))
        .await
        .unwrap();

    let tick = worker.tick().await.unwrap();
    assert_eq!(
        tick,
        Tick::Processed {
            id: "j1".into(),
            state: JobState::Completed
        }
    );

    let counts = store.status_counts().await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.pending, 0);
}

#[tokio::test]
async fn test_failing_job_dies_after_retries() {
    let (store, executor, worker) = setup();
    store
        .enqueue(NewJob::new("j2", "exit 1").with_max_retries(1))
        .await
        .unwrap();

    worker.tick().await.unwrap();
    assert_eq!(job_state(&store, "j2").await, (JobState::Pending, 1));

    worker.tick().await.unwrap();
    assert_eq!(job_state(&store, "j2").await, (JobState::Dead, 2));

    // Dead jobs are not claimed again
    assert_eq!(worker.tick().await.unwrap(), Tick::Idle);
    assert_eq!(executor.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dlq_retry_then_success() {
    let store = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(SwitchExecutor::default());
    let worker = Worker::new(0, store.clone(), executor.clone(), WorkerConfig::default());
    store
        .enqueue(NewJob::new("j2", "flaky").with_max_retries(1))
        .await
        .unwrap();
    worker.tick().await.unwrap();
    worker.tick().await.unwrap();

    let dlq = DlqManager::new(store.clone());
    let dead = dlq.list().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, "j2");
    assert_eq!(dead[0].last_stderr.as_deref(), Some("broken"));

    assert_eq!(dlq.retry("j2").await.unwrap(), DlqRetry::Requeued);
    assert_eq!(job_state(&store, "j2").await, (JobState::Pending, 0));
    assert!(dlq.list().await.unwrap().is_empty());

    executor.succeed.store(true, Ordering::SeqCst);
    assert_eq!(
        worker.tick().await.unwrap(),
        Tick::Processed {
            id: "j2".into(),
            state: JobState::Completed
        }
    );
    assert_eq!(job_state(&store, "j2").await, (JobState::Completed, 0));
}

#[tokio::test]
async fn test_reenqueue_after_dlq_runs_new_command() {
    let (store, _, worker) = setup();
    store
        .enqueue(NewJob::new("j2", "exit 1").with_max_retries(0))
        .await
        .unwrap();
    worker.tick().await.unwrap();
    assert_eq!(job_state(&store, "j2").await, (JobState::Dead, 1));

    store.enqueue(NewJob::new("j2", "exit 0")).await.unwrap();
    worker.tick().await.unwrap();
    assert_eq!(job_state(&store, "j2").await, (JobState::Completed, 0));
}

#[tokio::test]
async fn test_dlq_retry_unknown_id_changes_nothing() {
    let (store, _, _) = setup();
    store.enqueue(NewJob::new("j1", "exit 0")).await.unwrap();
    let before = store.query(JobFilter::All).await.unwrap();

    let dlq = DlqManager::new(store.clone());
    assert_eq!(dlq.retry("nonexistent").await.unwrap(), DlqRetry::NotInDlq);
    // Present but not dead
    assert_eq!(dlq.retry("j1").await.unwrap(), DlqRetry::NotInDlq);

    assert_eq!(store.query(JobFilter::All).await.unwrap(), before);
}

#[tokio::test]
async fn test_launch_failure_counts_as_attempt() {
    let (store, _, worker) = setup();
    store
        .enqueue(NewJob::new("j3", "no-such-thing").with_max_retries(0))
        .await
        .unwrap();

    worker.tick().await.unwrap();
    let job = &store.query(JobFilter::Id("j3".into())).await.unwrap()[0];
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.last_exit_code, Some(-1));
    assert!(job.last_stderr.as_deref().unwrap().contains("cannot run"));
}

#[tokio::test]
async fn test_reenqueue_overwrites_progress() {
    let (store, _, worker) = setup();
    store
        .enqueue(NewJob::new("j1", "exit 1").with_max_retries(5))
        .await
        .unwrap();
    worker.tick().await.unwrap();
    worker.tick().await.unwrap();
    assert_eq!(job_state(&store, "j1").await, (JobState::Pending, 2));

    store.enqueue(NewJob::new("j1", "exit 1")).await.unwrap();
    assert_eq!(job_state(&store, "j1").await, (JobState::Pending, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_are_exclusive() {
    let store = Arc::new(MemoryJobStore::new());
    for i in 0..50 {
        store
            .enqueue(NewJob::new(format!("job-{:02}", i), "exit 0"))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = store.claim_next().await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for task in tasks {
        for id in task.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "job claimed twice");
        }
    }
    assert_eq!(total, 50);
    assert_eq!(seen.len(), 50);
}

#[tokio::test]
async fn test_claim_order_is_fifo() {
    let store = MemoryJobStore::new();
    store.enqueue(NewJob::new("first", "exit 0")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.enqueue(NewJob::new("second", "exit 0")).await.unwrap();

    assert_eq!(store.claim_next().await.unwrap().unwrap().id, "first");
    assert_eq!(store.claim_next().await.unwrap().unwrap().id, "second");
}

#[tokio::test]
async fn test_pool_drains_queue() {
    let store = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(ScriptedExecutor::default());
    for i in 0..10 {
        store
            .enqueue(NewJob::new(format!("job-{}", i), "exit 0"))
            .await
            .unwrap();
    }

    let pool = WorkerPool::new(
        store.clone(),
        executor.clone(),
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
        },
    );
    let handle = pool.start(3).unwrap();
    assert_eq!(handle.len(), 3);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.status_counts().await.unwrap().completed < 10 {
        assert!(tokio::time::Instant::now() < deadline, "pool did not drain queue");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.abort();
    handle.join().await;
    assert_eq!(executor.runs.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_pool_rejects_zero_workers() {
    let pool = WorkerPool::new(
        Arc::new(MemoryJobStore::new()),
        Arc::new(ScriptedExecutor::default()),
        WorkerConfig::default(),
    );
    assert!(pool.start(0).is_err());
}
