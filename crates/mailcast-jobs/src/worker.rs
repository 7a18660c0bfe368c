//! Worker pool for processing jobs.

use crate::config::WorkerConfig;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobContext, JobData, JobHandler, JobStatus};
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::queue::JobQueue;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::any::Any;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum jobs executing at once.
    pub concurrency: usize,

    /// Jobs to start before the pool exits with [`WorkerExit::Recycle`]
    /// (0 = never).
    pub max_jobs: u64,

    /// Jobs started per minute across the pool.
    pub rate_limit_per_minute: Option<NonZeroU32>,

    /// Job execution timeout.
    pub job_timeout: Duration,

    /// Polling interval when the queues are empty.
    pub poll_interval: Duration,

    /// Shutdown timeout.
    pub shutdown_timeout: Duration,

    /// Heartbeat interval.
    pub heartbeat_interval: Duration,

    /// Heartbeat key lifetime.
    pub heartbeat_ttl: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_jobs: config.max_jobs_per_worker,
            rate_limit_per_minute: config.rate_limit(),
            job_timeout: config.job_timeout(),
            poll_interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_ttl: config.heartbeat_ttl(),
        }
    }
}

/// Serialised outcome of a handler run.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    /// Result stored in the backend.
    pub result: serde_json::Value,

    /// Whether the job is recorded as `Succeeded`.
    pub success: bool,
}

type ErasedHandler = Arc<
    dyn Fn(JobData, JobContext) -> BoxFuture<'static, Result<HandlerOutput, JobError>>
        + Send
        + Sync,
>;

/// Why [`WorkerPool::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// `stop()` was called.
    Shutdown,
    /// The pool started `max_jobs` jobs and should be replaced.
    Recycle,
}

#[derive(Default)]
struct PoolCounters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Worker pool for concurrent job processing.
pub struct WorkerPool<Q: JobQueue> {
    /// Worker ID used for heartbeats and job leases.
    id: String,

    /// Job queue.
    queue: Arc<Q>,

    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Registered job handlers by job name.
    handlers: RwLock<HashMap<String, ErasedHandler>>,

    /// Queues polled, in registration order.
    queues: RwLock<Vec<String>>,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Set once `stop()` is called.
    stopping: AtomicBool,

    /// Running flag.
    running: AtomicBool,

    limiter: Option<Arc<DefaultDirectRateLimiter>>,

    counters: Arc<PoolCounters>,
}

impl<Q: JobQueue> WorkerPool<Q> {
    /// Create a new worker pool.
    pub fn new(queue: Arc<Q>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let limiter = config
            .rate_limit_per_minute
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_minute(n))));

        Self {
            id: format!("worker-{}", Uuid::new_v4()),
            queue,
            config,
            handlers: RwLock::new(HashMap::new()),
            queues: RwLock::new(Vec::new()),
            shutdown_tx,
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(false),
            limiter,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Register the handler for job type `J` and poll `J::QUEUE`.
    pub fn register<J, H>(&self, handler: H)
    where
        J: Job,
        H: JobHandler<J>,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(
            move |data: JobData,
                  ctx: JobContext|
                  -> BoxFuture<'static, Result<HandlerOutput, JobError>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let job: J = data.deserialize()?;
                    let output = handler.handle(job, ctx).await?;
                    let success = J::is_success(&output);
                    Ok(HandlerOutput {
                        result: serde_json::to_value(&output)?,
                        success,
                    })
                })
            },
        );

        self.handlers.write().insert(J::NAME.to_string(), erased);

        let mut queues = self.queues.write();
        if !queues.iter().any(|q| q == J::QUEUE) {
            queues.push(J::QUEUE.to_string());
        }

        info!(job_type = J::NAME, queue = J::QUEUE, "Registered job handler");
    }

    /// Run until stopped or until `max_jobs` jobs have been started.
    pub async fn run(&self) -> JobResult<WorkerExit> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Worker("Worker pool already running".to_string()));
        }

        let queues = self.queues.read().clone();
        if queues.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return Err(JobError::Configuration(
                "No job handlers registered".to_string(),
            ));
        }

        info!(
            worker_id = %self.id,
            concurrency = self.config.concurrency,
            queues = ?queues,
            "Starting worker pool"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut maintenance = tokio::time::interval(self.config.heartbeat_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut started = 0u64;

        let exit = 'poll: loop {
            if self.stopping.load(Ordering::SeqCst) {
                break 'poll WorkerExit::Shutdown;
            }
            if self.config.max_jobs > 0 && started >= self.config.max_jobs {
                break 'poll WorkerExit::Recycle;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(worker_id = %self.id, "Received shutdown signal");
                    break 'poll WorkerExit::Shutdown;
                }

                _ = maintenance.tick() => {
                    self.maintain().await;
                }

                permit = Arc::clone(&semaphore).acquire_owned() => {
                    let Ok(permit) = permit else {
                        break 'poll WorkerExit::Shutdown;
                    };

                    match self.queue.dequeue(&queues, &self.id).await {
                        Ok(Some(job)) => {
                            started += 1;
                            self.spawn_job(job, permit, &semaphore);
                        }
                        Ok(None) => {
                            drop(permit);
                            tokio::select! {
                                _ = shutdown_rx.recv() => break 'poll WorkerExit::Shutdown,
                                () = tokio::time::sleep(self.config.poll_interval) => {}
                            }
                        }
                        Err(e) => {
                            drop(permit);
                            error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        };

        info!(worker_id = %self.id, "Waiting for in-flight jobs to finish...");
        #[allow(clippy::cast_possible_truncation)]
        let all = self.config.concurrency as u32;
        if timeout(self.config.shutdown_timeout, semaphore.acquire_many(all))
            .await
            .is_err()
        {
            warn!(worker_id = %self.id, "Shutdown timeout elapsed with jobs still running");
        }

        self.running.store(false, Ordering::SeqCst);

        if exit == WorkerExit::Recycle {
            WorkerMetrics::recycled();
        }

        info!(
            worker_id = %self.id,
            exit = ?exit,
            started = self.counters.started.load(Ordering::Relaxed),
            succeeded = self.counters.succeeded.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            "Worker pool stopped"
        );

        Ok(exit)
    }

    /// Refresh the heartbeat and recover jobs abandoned by dead workers.
    async fn maintain(&self) {
        if let Err(e) = self
            .queue
            .heartbeat(&self.id, self.config.heartbeat_ttl)
            .await
        {
            warn!(worker_id = %self.id, error = %e, "Failed to refresh heartbeat");
            return;
        }

        match self.queue.recover_stale_jobs().await {
            Ok(0) => {}
            Ok(n) => info!(worker_id = %self.id, count = n, "Recovered stale jobs"),
            Err(e) => warn!(worker_id = %self.id, error = %e, "Stale job recovery failed"),
        }
    }

    fn spawn_job(&self, job: JobData, permit: OwnedSemaphorePermit, semaphore: &Semaphore) {
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        WorkerMetrics::update_in_flight(
            &self.id,
            self.config.concurrency - semaphore.available_permits(),
            self.config.concurrency,
        );

        let handler = self.handlers.read().get(&job.name).cloned();
        let queue = Arc::clone(&self.queue);
        let limiter = self.limiter.clone();
        let counters = Arc::clone(&self.counters);
        let worker_id = self.id.clone();
        let job_timeout = self
            .config
            .job_timeout
            .min(Duration::from_secs(job.timeout_secs.max(1)));

        let span = info_span!(
            "job",
            job_id = %job.id,
            job_name = %job.name,
            attempt = job.attempt,
            worker_id = %worker_id
        );

        tokio::spawn(
            async move {
                let _permit = permit;
                let succeeded = process_job(
                    queue.as_ref(),
                    handler,
                    limiter.as_deref(),
                    job,
                    &worker_id,
                    job_timeout,
                )
                .await;
                if succeeded {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            .instrument(span),
        );
    }

    /// Stop the worker pool.
    pub fn stop(&self) {
        info!(worker_id = %self.id, "Stopping worker pool...");
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the worker ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            concurrency: self.config.concurrency,
            jobs_started: self.counters.started.load(Ordering::Relaxed),
            jobs_succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            jobs_failed: self.counters.failed.load(Ordering::Relaxed),
            queues: self.queues.read().clone(),
        }
    }
}

/// Runs one attempt and records its outcome. Returns true on success.
async fn process_job<Q: JobQueue>(
    queue: &Q,
    handler: Option<ErasedHandler>,
    limiter: Option<&DefaultDirectRateLimiter>,
    job: JobData,
    worker_id: &str,
    job_timeout: Duration,
) -> bool {
    let job_id = job.id.clone();
    let job_name = job.name.clone();
    let queue_name = job.queue.clone();

    let Some(handler) = handler else {
        error!(job_name = %job_name, "No handler registered for job type");
        let err = JobError::Configuration(format!("No handler for job type: {job_name}"));
        if let Err(e) = queue.fail(&job_id, &err).await {
            error!(job_id = %job_id, error = %e, "Failed to mark job as failed");
        }
        return false;
    };

    if let Some(limiter) = limiter {
        limiter.until_ready().await;
    }

    JobMetrics::job_dequeued(&queue_name, &job_name);
    if let Ok(wait) = (Utc::now() - job.scheduled_at).to_std() {
        JobMetrics::job_wait_time(&queue_name, &job_name, wait);
    }

    let ctx = job.to_context(worker_id);
    debug!("Processing job");

    let started = Instant::now();
    let attempt = AssertUnwindSafe(async move { handler(job, ctx).await }).catch_unwind();
    let outcome = timeout(job_timeout, attempt).await;
    let elapsed = started.elapsed();

    let error = match outcome {
        Ok(Ok(Ok(output))) => {
            if let Err(e) = queue.complete(&job_id, output.result, output.success).await {
                error!(job_id = %job_id, error = %e, "Failed to record job result");
                return false;
            }
            if output.success {
                debug!(job_id = %job_id, "Job succeeded");
                JobMetrics::job_succeeded(&queue_name, &job_name, elapsed);
            } else {
                warn!(job_id = %job_id, "Job finished with a failure result");
                JobMetrics::job_failed(&queue_name, &job_name, "result", elapsed);
            }
            return output.success;
        }
        Ok(Ok(Err(e))) => {
            warn!(job_id = %job_id, error = %e, "Job attempt failed");
            e
        }
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(job_id = %job_id, panic = %message, "Job handler panicked");
            JobError::Internal(format!("handler panicked: {message}"))
        }
        Err(_) => {
            warn!(job_id = %job_id, timeout_secs = job_timeout.as_secs(), "Job timed out");
            JobMetrics::job_timed_out(&queue_name, &job_name);
            JobError::Timeout(job_timeout.as_secs())
        }
    };

    JobMetrics::job_failed(&queue_name, &job_name, error.kind(), elapsed);

    match queue.fail(&job_id, &error).await {
        Ok(JobStatus::Retrying) => {
            if let Some(info) = queue.get_job(&job_id).await.ok().flatten() {
                JobMetrics::job_retried(&queue_name, &job_name, info.attempt);
                info!(job_id = %job_id, attempt = info.attempt, retry_at = %info.scheduled_at, "Job will be retried");
            }
        }
        Ok(status) => debug!(job_id = %job_id, status = %status, "Job terminated"),
        Err(e) => error!(job_id = %job_id, error = %e, "Failed to mark job as failed"),
    }

    false
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    /// Worker ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Jobs started.
    pub jobs_started: u64,

    /// Jobs whose attempt succeeded.
    pub jobs_succeeded: u64,

    /// Attempts that failed, timed out or produced a failure result.
    pub jobs_failed: u64,

    /// Queues being processed.
    pub queues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryJobQueue;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Serialize, Deserialize)]
    struct Echo {
        value: u32,
    }

    impl Job for Echo {
        const NAME: &'static str = "echo";
        const QUEUE: &'static str = "echo_queue";
        type Output = u32;

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::fixed(3, Duration::ZERO)
        }
    }

    struct EchoHandler {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    #[async_trait]
    impl JobHandler<Echo> for EchoHandler {
        async fn handle(&self, job: Echo, _ctx: JobContext) -> Result<u32, JobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(JobError::ExecutionFailed("not yet".into()));
            }
            Ok(job.value * 2)
        }
    }

    fn test_config(max_jobs: u64) -> WorkerPoolConfig {
        WorkerPoolConfig {
            concurrency: 2,
            max_jobs,
            rate_limit_per_minute: None,
            job_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(5),
            shutdown_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_ttl: Duration::from_secs(90),
        }
    }

    #[test]
    fn test_worker_pool_config_from_worker_config() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.max_jobs, 50);
        assert_eq!(config.rate_limit_per_minute.map(NonZeroU32::get), Some(10));
    }

    #[tokio::test]
    async fn test_run_without_handlers_is_an_error() {
        let pool = WorkerPool::new(Arc::new(InMemoryJobQueue::new()), test_config(0));
        assert!(matches!(pool.run().await, Err(JobError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_recycles_after_max_jobs() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let calls = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::new(Arc::clone(&queue), test_config(2));
        pool.register(EchoHandler {
            calls: Arc::clone(&calls),
            fail_first: 0,
        });

        let a = queue.enqueue(Echo { value: 1 }).await.unwrap();
        let b = queue.enqueue(Echo { value: 2 }).await.unwrap();

        let exit = pool.run().await.unwrap();
        assert_eq!(exit, WorkerExit::Recycle);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        for (id, expected) in [(a, 2), (b, 4)] {
            let info = queue.get_job(&id).await.unwrap().unwrap();
            assert_eq!(info.status, JobStatus::Succeeded);
            assert_eq!(info.result, Some(serde_json::json!(expected)));
        }
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let calls = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::new(Arc::clone(&queue), test_config(3));
        pool.register(EchoHandler {
            calls: Arc::clone(&calls),
            fail_first: 2,
        });

        let id = queue.enqueue(Echo { value: 5 }).await.unwrap();
        pool.run().await.unwrap();

        let info = queue.get_job(&id).await.unwrap().unwrap();
        assert_eq!(info.status, JobStatus::Succeeded);
        assert_eq!(info.attempt, 3);
        assert_eq!(pool.stats().jobs_failed, 2);
    }

    struct PanickingHandler;

    #[async_trait]
    impl JobHandler<Echo> for PanickingHandler {
        async fn handle(&self, job: Echo, _ctx: JobContext) -> Result<u32, JobError> {
            panic!("cannot echo {}", job.value);
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_marks_job_failed() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let pool = WorkerPool::new(Arc::clone(&queue), test_config(1));
        pool.register(PanickingHandler);

        let id = queue.enqueue(Echo { value: 7 }).await.unwrap();
        assert_eq!(pool.run().await.unwrap(), WorkerExit::Recycle);

        let info = queue.get_job(&id).await.unwrap().unwrap();
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.attempt, 1);
        assert!(info
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("handler panicked: cannot echo 7")));
        assert_eq!(pool.stats().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_stop_before_run_exits_with_shutdown() {
        let pool = WorkerPool::new(Arc::new(InMemoryJobQueue::new()), test_config(0));
        pool.register(EchoHandler {
            calls: Arc::new(AtomicU32::new(0)),
            fail_first: 0,
        });
        pool.stop();
        assert_eq!(pool.run().await.unwrap(), WorkerExit::Shutdown);
    }

    #[tokio::test]
    async fn test_heartbeat_registers_worker() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let pool = Arc::new(WorkerPool::new(Arc::clone(&queue), test_config(0)));
        pool.register(EchoHandler {
            calls: Arc::new(AtomicU32::new(0)),
            fail_first: 0,
        });

        let runner = Arc::clone(&pool);
        let handle = tokio::spawn(async move { runner.run().await });

        let mut seen = false;
        for _ in 0..100 {
            if queue.live_workers().await.unwrap().contains(&pool.id().to_string()) {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.stop();

        assert!(seen);
        assert_eq!(handle.await.unwrap().unwrap(), WorkerExit::Shutdown);
    }
}
