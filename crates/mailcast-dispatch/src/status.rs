//! Status queries for send and bulk dispatch handles.

use crate::bulk::{BulkDispatchResult, ChildJob};
use crate::error::{DispatchError, DispatchResult};
use mailcast_jobs::{JobId, JobInfo, JobQueue, JobStatusReport, JobStatusTracker, StateCounts};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A child send job and its current state.
#[derive(Debug, Clone, Serialize)]
pub struct ChildStatus {
    pub child: ChildJob,
    pub report: JobStatusReport,
}

/// Aggregated view of a bulk dispatch handle.
#[derive(Debug, Clone, Serialize)]
pub struct BulkStatus {
    /// State of the bulk job itself.
    pub report: JobStatusReport,
    /// Its result, once it has run.
    pub outcome: Option<BulkDispatchResult>,
    /// Per-child states, in manifest order.
    pub children: Vec<ChildStatus>,
    /// Totals over `children`.
    pub counts: StateCounts,
}

/// Read-only status facade.
pub struct StatusService<Q: JobQueue> {
    tracker: JobStatusTracker<Q>,
}

impl<Q: JobQueue> StatusService<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        Self {
            tracker: JobStatusTracker::new(queue),
        }
    }

    /// State and result of one handle. Unknown or expired handles report
    /// `JobState::Unknown`.
    pub async fn query_job(&self, job_id: &JobId) -> DispatchResult<JobStatusReport> {
        Ok(self.tracker.query(job_id).await?)
    }

    /// Queries every child of a bulk handle and tallies their states.
    ///
    /// A bulk job that has not run yet, or whose record expired, reports no
    /// children.
    pub async fn query_bulk(&self, job_id: &JobId) -> DispatchResult<BulkStatus> {
        let report = self.tracker.query(job_id).await?;

        let outcome = match &report.result {
            Some(value) => Some(
                serde_json::from_value::<BulkDispatchResult>(value.clone())
                    .map_err(|_| DispatchError::NotABulkJob(job_id.to_string()))?,
            ),
            None => None,
        };

        let manifest = outcome.as_ref().map(BulkDispatchResult::tasks).unwrap_or_default();
        let ids: Vec<JobId> = manifest.iter().map(|c| c.job_id.clone()).collect();
        let reports = self.tracker.query_many(&ids).await?;
        let counts = StateCounts::tally(&reports);

        debug!(
            job_id = %job_id,
            children = ids.len(),
            succeeded = counts.succeeded,
            failed = counts.failed,
            pending = counts.pending,
            unknown = counts.unknown,
            "Bulk status aggregated"
        );

        let children = manifest
            .iter()
            .cloned()
            .zip(reports)
            .map(|(child, report)| ChildStatus { child, report })
            .collect();

        Ok(BulkStatus {
            report,
            outcome,
            children,
            counts,
        })
    }

    /// Non-terminal jobs, running first.
    pub async fn list_active(&self, limit: usize) -> DispatchResult<Vec<JobInfo>> {
        Ok(self.tracker.list_active(limit).await?)
    }

    /// Workers with a live heartbeat.
    pub async fn live_workers(&self) -> DispatchResult<Vec<String>> {
        Ok(self.tracker.live_workers().await?)
    }
}
