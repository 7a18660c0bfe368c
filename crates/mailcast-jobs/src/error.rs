//! Job error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job execution failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Job was cancelled.
    #[error("Job was cancelled")]
    Cancelled,

    /// Job timed out.
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid job state.
    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A delay or backoff pushes the schedule past the representable range.
    #[error("Schedule out of range: {0}")]
    ScheduleOutOfRange(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::ExecutionFailed(_)
                | JobError::Timeout(_)
                | JobError::Redis(_)
                | JobError::Pool(_)
                | JobError::Worker(_)
        )
    }

    /// Returns true if the queue backend itself could not be reached.
    pub fn is_backend_unavailable(&self) -> bool {
        match self {
            JobError::Pool(_) => true,
            JobError::Redis(e) => e.is_connection_refusal() || e.is_io_error() || e.is_timeout(),
            _ => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::ExecutionFailed(_) => "execution_failed",
            JobError::Cancelled => "cancelled",
            JobError::Timeout(_) => "timeout",
            JobError::Serialization(_) => "serialization",
            JobError::Redis(_) | JobError::Pool(_) => "backend",
            JobError::NotFound(_) => "not_found",
            JobError::InvalidState { .. } => "invalid_state",
            JobError::Worker(_) => "worker",
            JobError::Configuration(_) => "configuration",
            JobError::ScheduleOutOfRange(_) => "schedule",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<JobError> for mailcast_core::MailcastError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => mailcast_core::MailcastError::not_found("job", id),
            JobError::Configuration(msg) => mailcast_core::MailcastError::Configuration(msg),
            JobError::Timeout(secs) => {
                mailcast_core::MailcastError::Timeout(format!("job exceeded {secs}s"))
            }
            e @ (JobError::Redis(_) | JobError::Pool(_)) => {
                mailcast_core::MailcastError::external("queue backend", e.to_string())
            }
            other => mailcast_core::MailcastError::Internal(other.to_string()),
        }
    }
}
