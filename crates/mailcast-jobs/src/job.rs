//! Job trait and definitions.

use crate::error::{JobError, JobResult};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job execution context.
///
/// Carries the retry bookkeeping for the current execution so handlers can
/// decide between requesting a retry and producing a terminal result.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum attempts allowed.
    pub max_attempts: u32,

    /// Queue name.
    pub queue: String,

    /// Job was scheduled at this time.
    pub scheduled_at: DateTime<Utc>,

    /// Job started executing at this time.
    pub started_at: DateTime<Utc>,

    /// Worker ID processing this job.
    pub worker_id: String,
}

impl JobContext {
    /// Returns true if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns remaining attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

/// A serialisable unit of work.
///
/// The job value is the payload; execution lives in a [`JobHandler`] so that
/// collaborators (transports, queues) are injected rather than looked up.
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique name for this job type.
    const NAME: &'static str;

    /// Queue name for this job type.
    const QUEUE: &'static str = "default";

    /// Total number of attempts, including the first one.
    const MAX_ATTEMPTS: u32 = 3;

    /// Job timeout in seconds.
    const TIMEOUT_SECS: u64 = 300;

    /// Result persisted in the backend when the job terminates.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Returns the retry policy for this job.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(Self::MAX_ATTEMPTS)
    }

    /// Returns the job timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(Self::TIMEOUT_SECS)
    }

    /// Whether a returned output counts as success.
    ///
    /// Handlers may return a structured failure as `Ok`, which records the
    /// job as terminally `Failed` without further retries.
    fn is_success(_output: &Self::Output) -> bool {
        true
    }
}

/// Executes jobs of type `J`.
#[async_trait]
pub trait JobHandler<J: Job>: Send + Sync + 'static {
    /// Runs one attempt of the job.
    ///
    /// Returning `Err` with a retryable error asks the queue to retry the
    /// job according to its policy.
    async fn handle(&self, job: J, ctx: JobContext) -> Result<J::Output, JobError>;
}

/// Job status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to become eligible or to be picked up.
    #[default]
    Pending,
    /// Currently executing on a worker.
    Running,
    /// Failed an attempt and waiting for its backoff to elapse.
    Retrying,
    /// Terminated successfully.
    Succeeded,
    /// Terminated unsuccessfully.
    Failed,
}

impl JobStatus {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Retrying => write!(f, "retrying"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Serialized job data stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    /// Job ID.
    pub id: JobId,

    /// Job type name.
    pub name: String,

    /// Queue name.
    pub queue: String,

    /// Serialized job payload.
    pub payload: String,

    /// Number of attempts started so far.
    pub attempt: u32,

    /// Maximum attempts.
    pub max_attempts: u32,

    /// Job timeout in seconds.
    pub timeout_secs: u64,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Earliest time the job may start.
    pub scheduled_at: DateTime<Utc>,

    /// When the current attempt started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Current status.
    #[serde(default)]
    pub status: JobStatus,

    /// Retry policy.
    pub retry_policy: RetryPolicy,

    /// Worker holding the job while running.
    #[serde(default)]
    pub worker_id: Option<String>,

    /// Error from last failed attempt.
    #[serde(default)]
    pub last_error: Option<String>,

    /// Terminal result payload.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl JobData {
    /// Creates new job data from a Job instance.
    pub fn new<J: Job>(job: &J) -> JobResult<Self> {
        let payload = serde_json::to_string(job)?;
        let policy = job.retry_policy();
        let now = Utc::now();

        Ok(Self {
            id: JobId::new(),
            name: J::NAME.to_string(),
            queue: J::QUEUE.to_string(),
            payload,
            attempt: 0,
            max_attempts: policy.max_attempts,
            timeout_secs: job.timeout().as_secs(),
            created_at: now,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            status: JobStatus::Pending,
            retry_policy: policy,
            worker_id: None,
            last_error: None,
            result: None,
        })
    }

    /// Deserialize the job payload.
    pub fn deserialize<J: Job>(&self) -> JobResult<J> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Deserialize the terminal result, if any.
    pub fn output<J: Job>(&self) -> JobResult<Option<J::Output>> {
        match &self.result {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Marks the record as picked up by `worker_id`.
    pub fn start_attempt(&mut self, worker_id: &str) {
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = Some(worker_id.to_string());
    }

    /// Check if max attempts reached.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Set the last error.
    pub fn set_error(&mut self, error: &JobError) {
        self.last_error = Some(error.to_string());
    }

    /// Records a terminal outcome.
    pub fn finish(&mut self, result: Option<serde_json::Value>, success: bool) {
        self.status = if success {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        self.result = result;
        self.completed_at = Some(Utc::now());
        self.worker_id = None;
    }

    /// Create job context for execution.
    pub fn to_context(&self, worker_id: &str) -> JobContext {
        JobContext {
            job_id: self.id.clone(),
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            queue: self.queue.clone(),
            scheduled_at: self.scheduled_at,
            started_at: self.started_at.unwrap_or_else(Utc::now),
            worker_id: worker_id.to_string(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Job information for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID.
    pub id: JobId,

    /// Job type name.
    pub name: String,

    /// Queue name.
    pub queue: String,

    /// Current status.
    pub status: JobStatus,

    /// Current attempt.
    pub attempt: u32,

    /// Max attempts.
    pub max_attempts: u32,

    /// Created timestamp.
    pub created_at: DateTime<Utc>,

    /// Scheduled timestamp.
    pub scheduled_at: DateTime<Utc>,

    /// Started timestamp.
    pub started_at: Option<DateTime<Utc>>,

    /// Completed timestamp.
    pub completed_at: Option<DateTime<Utc>>,

    /// Last error.
    pub last_error: Option<String>,

    /// Worker ID (if being processed).
    pub worker_id: Option<String>,

    /// Terminal result payload.
    pub result: Option<serde_json::Value>,
}

impl From<JobData> for JobInfo {
    fn from(data: JobData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            queue: data.queue,
            status: data.status,
            attempt: data.attempt,
            max_attempts: data.max_attempts,
            created_at: data.created_at,
            scheduled_at: data.scheduled_at,
            started_at: data.started_at,
            completed_at: data.completed_at,
            last_error: data.last_error,
            worker_id: data.worker_id,
            result: data.result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct TestJob {
        message: String,
    }

    impl Job for TestJob {
        const NAME: &'static str = "test_job";
        const QUEUE: &'static str = "test";
        type Output = String;
    }

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_job_id_serializes_as_plain_string() {
        let id = JobId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_job_data_serialization() {
        let job = TestJob {
            message: "Hello".to_string(),
        };

        let data = JobData::new(&job).unwrap();
        assert_eq!(data.name, "test_job");
        assert_eq!(data.queue, "test");
        assert_eq!(data.status, JobStatus::Pending);

        let json = data.to_json().unwrap();
        let restored = JobData::from_json(&json).unwrap();
        assert_eq!(data.id, restored.id);
        assert_eq!(restored.deserialize::<TestJob>().unwrap().message, "Hello");
    }

    #[test]
    fn test_job_context_counts_attempts_from_one() {
        let job = TestJob {
            message: "Test".to_string(),
        };
        let mut data = JobData::new(&job).unwrap();
        data.start_attempt("worker-1");
        let ctx = data.to_context("worker-1");

        assert_eq!(ctx.attempt, 1);
        assert_eq!(ctx.max_attempts, 3);
        assert_eq!(ctx.remaining_attempts(), 2);
        assert!(!ctx.is_last_attempt());
        assert_eq!(data.status, JobStatus::Running);
    }

    #[test]
    fn test_finish_records_result() {
        let job = TestJob {
            message: "Test".to_string(),
        };
        let mut data = JobData::new(&job).unwrap();
        data.start_attempt("w");
        data.finish(Some(serde_json::json!("done")), true);

        assert_eq!(data.status, JobStatus::Succeeded);
        assert!(data.worker_id.is_none());
        assert!(data.completed_at.is_some());
        assert_eq!(data.output::<TestJob>().unwrap().as_deref(), Some("done"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }
}
