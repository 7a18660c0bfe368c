//! Dispatch entry point: synchronous loop or asynchronous bulk submission.

use crate::bulk::BulkDispatchJob;
use crate::error::{DispatchError, DispatchResult};
use crate::send::TemplateSettings;
use mailcast_config::DispatchConfig;
use mailcast_jobs::{JobId, JobQueue};
use mailcast_mail::{MailTransport, RecipientStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// How a dispatch is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Submit a bulk job and return its handle.
    #[default]
    Async,
    /// Send inline, one message at a time.
    Sync,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Async => f.write_str("async"),
            DispatchMode::Sync => f.write_str("sync"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "async" => Ok(DispatchMode::Async),
            "sync" => Ok(DispatchMode::Sync),
            other => Err(format!("unknown dispatch mode '{other}' (expected async or sync)")),
        }
    }
}

/// Parameters of one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub recipients_path: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    /// Whole seconds between consecutive sends.
    pub delay_secs: u64,
    pub simulate: bool,
    pub limit: Option<usize>,
}

impl DispatchRequest {
    /// A request using the configured default delay and no overrides.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            recipients_path: None,
            template_path: None,
            delay_secs: config.default_delay_secs,
            simulate: false,
            limit: None,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Outcome of a synchronous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: usize,
    pub skipped_rows: usize,
}

/// Outcome of an asynchronous submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncSubmission {
    /// Handle of the bulk dispatch job.
    pub job_id: JobId,
    /// Workers seen alive at submission time.
    pub live_workers: usize,
}

/// Dispatch entry point.
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Sends to every recipient in file order, sleeping `request.delay_secs`
    /// between messages. Stops at the first failed send.
    pub async fn run_sync<T>(
        &self,
        transport: &T,
        request: &DispatchRequest,
    ) -> DispatchResult<SyncReport>
    where
        T: MailTransport + ?Sized,
    {
        let path = self.recipients_path(request);
        let mut list = RecipientStore::new(&path).load_all()?;
        if let Some(limit) = request.limit.filter(|&k| k > 0) {
            list.recipients.truncate(limit);
        }

        let template =
            TemplateSettings::from(&self.config).resolve(request.template_path.as_ref())?;

        info!(
            recipients = list.recipients.len(),
            template = %template.path.display(),
            subject = %template.subject,
            simulate = request.simulate,
            "Starting synchronous dispatch"
        );

        let mut sent = 0;
        for (i, recipient) in list.recipients.iter().enumerate() {
            if i > 0 && request.delay_secs > 0 {
                tokio::time::sleep(request.delay()).await;
            }

            if request.simulate {
                info!(recipient = %recipient.email, "Simulated send");
            } else {
                transport
                    .send_one(&recipient.email, &template.subject, &template.html)
                    .await
                    .map_err(|source| DispatchError::SyncAborted {
                        sent,
                        recipient: recipient.email.clone(),
                        source,
                    })?;
            }
            sent += 1;
        }

        info!(sent, "Synchronous dispatch finished");
        Ok(SyncReport {
            sent,
            skipped_rows: list.skipped,
        })
    }

    /// Checks the backend, then submits one bulk dispatch job and returns
    /// its handle without waiting for it.
    pub async fn submit_async<Q: JobQueue>(
        &self,
        queue: &Q,
        request: &DispatchRequest,
    ) -> DispatchResult<AsyncSubmission> {
        queue
            .health_check()
            .await
            .map_err(|e| DispatchError::BackendUnavailable(e.to_string()))?;

        let live_workers = match queue.live_workers().await {
            Ok(workers) => workers.len(),
            Err(e) => {
                warn!(error = %e, "Could not list workers");
                0
            }
        };
        if live_workers == 0 {
            warn!("No live worker found; jobs will wait until one starts");
        }

        let job = BulkDispatchJob {
            recipients_path: request.recipients_path.clone(),
            template_path: request.template_path.clone(),
            delay_secs: request.delay_secs,
            simulate: request.simulate,
            limit: request.limit,
        };
        let job_id = queue.enqueue(job).await?;

        info!(job_id = %job_id, live_workers, "Bulk dispatch submitted");
        Ok(AsyncSubmission {
            job_id,
            live_workers,
        })
    }

    fn recipients_path(&self, request: &DispatchRequest) -> PathBuf {
        request
            .recipients_path
            .clone()
            .unwrap_or_else(|| self.config.recipients_path.clone())
    }
}
