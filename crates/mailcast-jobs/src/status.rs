//! Job status queries over any [`JobQueue`] backend.

use crate::error::JobResult;
use crate::job::{JobId, JobInfo, JobStatus};
use crate::queue::JobQueue;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Observable state of a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to become eligible or to be picked up.
    Pending,
    /// Executing on a worker.
    Running,
    /// Waiting for a retry backoff.
    Retrying,
    /// Terminated successfully.
    Succeeded,
    /// Terminated unsuccessfully.
    Failed,
    /// The backend holds no record: never existed, or retention elapsed.
    Unknown,
}

impl From<JobStatus> for JobState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => JobState::Pending,
            JobStatus::Running => JobState::Running,
            JobStatus::Retrying => JobState::Retrying,
            JobStatus::Succeeded => JobState::Succeeded,
            JobStatus::Failed => JobState::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Retrying => "retrying",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Point-in-time report for one job handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    /// Handle that was queried.
    pub job_id: JobId,

    /// Current state.
    pub state: JobState,

    /// Terminal result payload, if any.
    pub result: Option<serde_json::Value>,

    /// Attempts started so far.
    pub attempt: u32,

    /// Maximum attempts.
    pub max_attempts: u32,

    /// Error from the last failed attempt.
    pub last_error: Option<String>,
}

impl JobStatusReport {
    fn unknown(job_id: JobId) -> Self {
        Self {
            job_id,
            state: JobState::Unknown,
            result: None,
            attempt: 0,
            max_attempts: 0,
            last_error: None,
        }
    }

    fn from_info(info: JobInfo) -> Self {
        Self {
            job_id: info.id,
            state: info.status.into(),
            result: info.result,
            attempt: info.attempt,
            max_attempts: info.max_attempts,
            last_error: info.last_error,
        }
    }

    /// True once the job succeeded or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded | JobState::Failed)
    }

    /// True if the job succeeded.
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// True if the job failed.
    pub fn is_failure(&self) -> bool {
        self.state == JobState::Failed
    }
}

/// Per-state totals over a set of handles.
///
/// `pending` covers every non-terminal state; expired or unknown handles are
/// counted apart from failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub succeeded: u64,
    pub failed: u64,
    pub pending: u64,
    pub unknown: u64,
}

impl StateCounts {
    /// Tallies a list of reports.
    pub fn tally<'a>(reports: impl IntoIterator<Item = &'a JobStatusReport>) -> Self {
        let mut counts = Self::default();
        for report in reports {
            match report.state {
                JobState::Succeeded => counts.succeeded += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Pending | JobState::Running | JobState::Retrying => counts.pending += 1,
                JobState::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Sum of all buckets.
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed + self.pending + self.unknown
    }
}

/// Read-only status lookups.
pub struct JobStatusTracker<Q: JobQueue> {
    queue: Arc<Q>,
}

impl<Q: JobQueue> Clone for JobStatusTracker<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<Q: JobQueue> JobStatusTracker<Q> {
    /// Creates a tracker over `queue`.
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }

    /// Reports the state of one handle. Unknown handles are not an error.
    pub async fn query(&self, job_id: &JobId) -> JobResult<JobStatusReport> {
        Ok(match self.queue.get_job(job_id).await? {
            Some(info) => JobStatusReport::from_info(info),
            None => JobStatusReport::unknown(job_id.clone()),
        })
    }

    /// Reports many handles, preserving order.
    pub async fn query_many(&self, job_ids: &[JobId]) -> JobResult<Vec<JobStatusReport>> {
        try_join_all(job_ids.iter().map(|id| self.query(id))).await
    }

    /// Non-terminal jobs known to the backend.
    pub async fn list_active(&self, limit: usize) -> JobResult<Vec<JobInfo>> {
        self.queue.list_active(limit).await
    }

    /// Workers with a live heartbeat.
    pub async fn live_workers(&self) -> JobResult<Vec<String>> {
        self.queue.live_workers().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: JobState) -> JobStatusReport {
        JobStatusReport {
            state,
            ..JobStatusReport::unknown(JobId::new())
        }
    }

    #[test]
    fn test_tally_groups_non_terminal_as_pending() {
        let reports = vec![
            report(JobState::Succeeded),
            report(JobState::Succeeded),
            report(JobState::Failed),
            report(JobState::Pending),
            report(JobState::Retrying),
            report(JobState::Running),
            report(JobState::Unknown),
        ];
        let counts = StateCounts::tally(&reports);
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.unknown, 1);
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn test_report_flags() {
        let done = report(JobState::Succeeded);
        assert!(done.is_terminal() && done.is_success() && !done.is_failure());

        let unknown = report(JobState::Unknown);
        assert!(!unknown.is_terminal());
        assert!(!unknown.is_failure());
    }

    #[test]
    fn test_state_from_status() {
        assert_eq!(JobState::from(JobStatus::Retrying), JobState::Retrying);
        assert_eq!(JobState::Unknown.to_string(), "unknown");
    }
}
