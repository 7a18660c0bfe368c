//! Bulk dispatch orchestration: one job that schedules one send job per
//! recipient with a progressive delay.

use crate::send::SendEmailJob;
use async_trait::async_trait;
use mailcast_jobs::{
    Job, JobContext, JobData, JobError, JobHandler, JobId, JobQueue, JobResult, QueuedJob,
    RetryPolicy,
};
use mailcast_mail::{Recipient, RecipientStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Fans a recipient list out into [`SendEmailJob`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDispatchJob {
    /// Recipient file; the worker's configured default when absent.
    #[serde(default)]
    pub recipients_path: Option<PathBuf>,
    /// Template forwarded to every send job.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    /// Seconds between consecutive sends.
    pub delay_secs: u64,
    #[serde(default)]
    pub simulate: bool,
    /// Keep only the first `limit` recipients when positive.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Job for BulkDispatchJob {
    const NAME: &'static str = "bulk_dispatch";
    const QUEUE: &'static str = "bulk_email_queue";
    const MAX_ATTEMPTS: u32 = 1;

    type Output = BulkDispatchResult;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    fn is_success(output: &BulkDispatchResult) -> bool {
        matches!(output, BulkDispatchResult::Scheduled { .. })
    }
}

/// One scheduled send job in a bulk manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildJob {
    pub job_id: JobId,
    pub recipient: String,
    pub name: String,
    pub scheduled_delay_secs: u64,
    pub simulate: bool,
}

/// Terminal result of a bulk dispatch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkDispatchResult {
    /// Every send job was enqueued.
    Scheduled {
        total_emails: usize,
        tasks: Vec<ChildJob>,
        /// Malformed rows ignored while reading the recipient file.
        skipped_rows: usize,
        message: String,
    },
    /// Nothing was enqueued.
    Failed { error: String },
}

impl BulkDispatchResult {
    /// Child manifest; empty for a failed dispatch.
    pub fn tasks(&self) -> &[ChildJob] {
        match self {
            Self::Scheduled { tasks, .. } => tasks,
            Self::Failed { .. } => &[],
        }
    }
}

/// Executes [`BulkDispatchJob`]s against a queue.
pub struct BulkDispatchHandler<Q: JobQueue> {
    queue: Arc<Q>,
    default_recipients: PathBuf,
    send_policy: Option<RetryPolicy>,
}

impl<Q: JobQueue> BulkDispatchHandler<Q> {
    /// Creates a handler reading `default_recipients` when a job names no file.
    pub fn new(queue: Arc<Q>, default_recipients: impl Into<PathBuf>) -> Self {
        Self {
            queue,
            default_recipients: default_recipients.into(),
            send_policy: None,
        }
    }

    /// Overrides the retry policy of the scheduled send jobs.
    pub fn with_send_policy(mut self, policy: RetryPolicy) -> Self {
        self.send_policy = Some(policy);
        self
    }

    /// Reads the recipients and enqueues all send jobs in one batch.
    ///
    /// Any failure before the batch is stored yields
    /// [`BulkDispatchResult::Failed`] with nothing enqueued.
    pub async fn schedule(&self, job: &BulkDispatchJob) -> BulkDispatchResult {
        match self.try_schedule(job).await {
            Ok(result) => result,
            Err(error) => {
                error!(error = %error, "Bulk dispatch failed before scheduling");
                BulkDispatchResult::Failed { error }
            }
        }
    }

    async fn try_schedule(&self, job: &BulkDispatchJob) -> Result<BulkDispatchResult, String> {
        let path = job
            .recipients_path
            .clone()
            .unwrap_or_else(|| self.default_recipients.clone());

        let mut list = RecipientStore::new(&path)
            .load_all()
            .map_err(|e| e.to_string())?;
        if let Some(limit) = job.limit.filter(|&k| k > 0) {
            list.recipients.truncate(limit);
        }

        info!(
            path = %path.display(),
            recipients = list.recipients.len(),
            skipped_rows = list.skipped,
            delay_secs = job.delay_secs,
            simulate = job.simulate,
            "Scheduling bulk dispatch"
        );

        let (batch, tasks) = self
            .build_batch(job, &list.recipients)
            .map_err(|e| e.to_string())?;
        self.queue
            .submit_batch(batch)
            .await
            .map_err(|e| e.to_string())?;

        let total = tasks.len();
        info!(total, "Send jobs scheduled");

        Ok(BulkDispatchResult::Scheduled {
            total_emails: total,
            tasks,
            skipped_rows: list.skipped,
            message: format!("{total} emails scheduled for asynchronous delivery"),
        })
    }

    fn build_batch(
        &self,
        job: &BulkDispatchJob,
        recipients: &[Recipient],
    ) -> JobResult<(Vec<JobData>, Vec<ChildJob>)> {
        let mut batch = Vec::with_capacity(recipients.len());
        let mut tasks = Vec::with_capacity(recipients.len());

        let offsets = (0u64..).map(|i| i.saturating_mul(job.delay_secs));
        for (offset, recipient) in offsets.zip(recipients) {
            let send = SendEmailJob {
                recipient_email: recipient.email.clone(),
                recipient_name: recipient.name.clone(),
                template_path: job.template_path.clone(),
                subject: None,
                simulate: job.simulate,
                scheduled_offset_secs: offset,
            };

            let mut queued = QueuedJob::new(send).delay(Duration::from_secs(offset));
            if let Some(policy) = &self.send_policy {
                queued = queued.with_retry(policy.clone());
            }
            let data = queued.build()?;

            tasks.push(ChildJob {
                job_id: data.id.clone(),
                recipient: recipient.email.clone(),
                name: recipient.name.clone(),
                scheduled_delay_secs: offset,
                simulate: job.simulate,
            });
            batch.push(data);
        }

        Ok((batch, tasks))
    }
}

#[async_trait]
impl<Q: JobQueue> JobHandler<BulkDispatchJob> for BulkDispatchHandler<Q> {
    async fn handle(
        &self,
        job: BulkDispatchJob,
        _ctx: JobContext,
    ) -> Result<BulkDispatchResult, JobError> {
        Ok(self.schedule(&job).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_has_no_tasks() {
        let result = BulkDispatchResult::Failed {
            error: "missing".into(),
        };
        assert!(result.tasks().is_empty());
        assert!(!BulkDispatchJob::is_success(&result));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "failed");
    }

    #[test]
    fn test_bulk_job_never_retries() {
        let policy = BulkDispatchJob::default().retry_policy();
        assert!(!policy.should_retry(1));
    }
}
