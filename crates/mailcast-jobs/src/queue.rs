//! Job queue abstraction.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobData, JobId, JobInfo, JobStatus};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Builder for enqueuing jobs with options.
pub struct QueuedJob<J: Job> {
    job: J,
    delay: Option<Duration>,
    scheduled_at: Option<DateTime<Utc>>,
    retry_policy: Option<RetryPolicy>,
}

impl<J: Job> QueuedJob<J> {
    /// Create a new queued job builder.
    pub fn new(job: J) -> Self {
        Self {
            job,
            delay: None,
            scheduled_at: None,
            retry_policy: None,
        }
    }

    /// Set a delay before execution.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.scheduled_at = None;
        self
    }

    /// Schedule for a specific time.
    pub fn at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self.delay = None;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the job data.
    pub fn build(self) -> JobResult<JobData> {
        let mut data = JobData::new(&self.job)?;

        if let Some(policy) = self.retry_policy {
            data.max_attempts = policy.max_attempts;
            data.retry_policy = policy;
        }

        if let Some(at) = self.scheduled_at {
            data.scheduled_at = at;
        } else if let Some(delay) = self.delay {
            data.scheduled_at = schedule_after(data.created_at, delay)?;
        }

        Ok(data)
    }
}

/// `base + delay`, or an error when the result cannot be represented.
pub(crate) fn schedule_after(base: DateTime<Utc>, delay: Duration) -> JobResult<DateTime<Utc>> {
    ChronoDuration::from_std(delay)
        .ok()
        .and_then(|d| base.checked_add_signed(d))
        .ok_or_else(|| {
            JobError::ScheduleOutOfRange(format!("{}s after {base}", delay.as_secs()))
        })
}

/// Queue and result backend.
///
/// Implementations provide at-least-once delivery: a job is handed to one
/// worker at a time, and a job whose worker disappears is recovered through
/// [`JobQueue::recover_stale_jobs`]. A job never starts before its
/// `scheduled_at`. Terminal records stay queryable for the configured
/// retention window and then disappear, after which [`JobQueue::get_job`]
/// returns `None`.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Enqueue a job.
    async fn enqueue<J: Job>(&self, job: J) -> JobResult<JobId> {
        self.enqueue_with(QueuedJob::new(job)).await
    }

    /// Enqueue a job with options.
    async fn enqueue_with<J: Job>(&self, queued: QueuedJob<J>) -> JobResult<JobId> {
        let data = queued.build()?;
        self.submit(data).await
    }

    /// Enqueue a job for later execution.
    async fn enqueue_delayed<J: Job>(&self, job: J, delay: Duration) -> JobResult<JobId> {
        self.enqueue_with(QueuedJob::new(job).delay(delay)).await
    }

    /// Store a prepared job record and make it eligible at `scheduled_at`.
    async fn submit(&self, job: JobData) -> JobResult<JobId>;

    /// Submit many jobs; either all of them are stored or none is.
    async fn submit_batch(&self, jobs: Vec<JobData>) -> JobResult<Vec<JobId>>;

    /// Dequeue the next eligible job from the specified queues.
    async fn dequeue(&self, queues: &[String], worker_id: &str) -> JobResult<Option<JobData>>;

    /// Record a terminal result for a running job.
    async fn complete(
        &self,
        job_id: &JobId,
        result: serde_json::Value,
        success: bool,
    ) -> JobResult<()>;

    /// Record a failed attempt. Retries the job if its policy allows,
    /// otherwise marks it `Failed`. Returns the resulting status.
    async fn fail(&self, job_id: &JobId, error: &JobError) -> JobResult<JobStatus>;

    /// Reschedule a job after its retry backoff, keeping its handle.
    async fn retry(&self, job_data: &JobData) -> JobResult<()>;

    /// Get job info by ID. `None` means unknown or expired.
    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobInfo>>;

    /// List non-terminal jobs: running first, then waiting.
    async fn list_active(&self, limit: usize) -> JobResult<Vec<JobInfo>>;

    /// Number of eligible jobs waiting in a queue.
    async fn queue_length(&self, queue: &str) -> JobResult<u64>;

    /// Cancel a job that has not started yet.
    async fn cancel(&self, job_id: &JobId) -> JobResult<()>;

    /// Refresh the liveness marker of a worker.
    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> JobResult<()>;

    /// Workers whose liveness marker has not expired.
    async fn live_workers(&self) -> JobResult<Vec<String>>;

    /// Fail running jobs whose worker is no longer alive.
    async fn recover_stale_jobs(&self) -> JobResult<u64>;

    /// Health check.
    async fn health_check(&self) -> JobResult<()>;
}

/// Decides what happens to a job after a failed attempt.
///
/// Shared by the backends so they agree on retry semantics.
pub(crate) fn apply_failure(job: &mut JobData, error: &JobError) -> JobStatus {
    job.set_error(error);
    job.worker_id = None;

    if error.is_retryable() && job.retry_policy.should_retry(job.attempt) {
        let delay = job.retry_policy.delay_for_attempt(job.attempt);
        match schedule_after(Utc::now(), delay) {
            Ok(at) => {
                job.scheduled_at = at;
                job.status = JobStatus::Retrying;
            }
            // No retry can ever become eligible.
            Err(e) => {
                job.set_error(&e);
                job.finish(None, false);
            }
        }
    } else {
        job.finish(None, false);
    }

    job.status
}

/// Queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name.
    pub queue: String,

    /// Eligible jobs waiting.
    pub pending: u64,

    /// Jobs currently running.
    pub active: u64,

    /// Jobs that terminated successfully.
    pub succeeded: u64,

    /// Jobs that terminated unsuccessfully.
    pub failed: u64,

    /// Attempts rescheduled for retry.
    pub retried: u64,
}
