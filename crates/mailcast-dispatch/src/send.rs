//! Send-one-email job.

use async_trait::async_trait;
use mailcast_config::DispatchConfig;
use mailcast_jobs::{Job, JobContext, JobError, JobHandler, RetryPolicy};
use mailcast_mail::{LoadedTemplate, MailResult, MailTransport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Attempts per send job, including the first.
pub const SEND_MAX_ATTEMPTS: u32 = 3;

/// Delay before a failed send is retried.
pub const SEND_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Delivers the current template to one recipient.
///
/// Recipient fields are a snapshot taken at scheduling time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailJob {
    pub recipient_email: String,
    pub recipient_name: String,
    /// Template file to send instead of the newest rendered one.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    /// Subject overriding the one extracted from the template.
    #[serde(default)]
    pub subject: Option<String>,
    /// Skip the transport and report a simulated success.
    #[serde(default)]
    pub simulate: bool,
    /// Offset from the bulk submission, for observability.
    #[serde(default)]
    pub scheduled_offset_secs: u64,
}

impl SendEmailJob {
    /// Creates a job for one recipient with no overrides.
    pub fn new(recipient_email: impl Into<String>, recipient_name: impl Into<String>) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            recipient_name: recipient_name.into(),
            template_path: None,
            subject: None,
            simulate: false,
            scheduled_offset_secs: 0,
        }
    }
}

impl Job for SendEmailJob {
    const NAME: &'static str = "send_email";
    const QUEUE: &'static str = "email_queue";
    const MAX_ATTEMPTS: u32 = SEND_MAX_ATTEMPTS;

    type Output = SendOutcome;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(Self::MAX_ATTEMPTS, SEND_RETRY_BACKOFF)
    }

    fn is_success(output: &SendOutcome) -> bool {
        !output.is_failed()
    }
}

/// Terminal result of a send job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Succeeded { recipient: String, name: String },
    Failed { recipient: String, name: String, error: String },
    Simulated { recipient: String, name: String },
}

impl SendOutcome {
    pub fn recipient(&self) -> &str {
        match self {
            Self::Succeeded { recipient, .. }
            | Self::Failed { recipient, .. }
            | Self::Simulated { recipient, .. } => recipient,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Template lookup settings used when a job carries no template override.
#[derive(Debug, Clone)]
pub struct TemplateSettings {
    pub dir: PathBuf,
    pub prefix: String,
    pub fallback_subject: String,
}

impl From<&DispatchConfig> for TemplateSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            dir: config.template_dir.clone(),
            prefix: config.template_prefix.clone(),
            fallback_subject: config.fallback_subject.clone(),
        }
    }
}

impl TemplateSettings {
    /// Loads `override_path` when it exists, else the newest rendered template.
    pub fn resolve(&self, override_path: Option<&PathBuf>) -> MailResult<LoadedTemplate> {
        match override_path.filter(|p| p.exists()) {
            Some(path) => LoadedTemplate::load(path, &self.fallback_subject),
            None => LoadedTemplate::load_latest(&self.dir, &self.prefix, &self.fallback_subject),
        }
    }
}

/// Executes [`SendEmailJob`]s.
///
/// A failed attempt is returned as a retryable error while attempts remain;
/// the last attempt records [`SendOutcome::Failed`] instead.
pub struct SendEmailHandler {
    transport: Arc<dyn MailTransport>,
    templates: TemplateSettings,
    simulate_delay: Duration,
}

impl SendEmailHandler {
    pub fn new(transport: Arc<dyn MailTransport>, config: &DispatchConfig) -> Self {
        Self {
            transport,
            templates: TemplateSettings::from(config),
            simulate_delay: config.simulate_delay(),
        }
    }

    async fn deliver(&self, job: &SendEmailJob) -> MailResult<()> {
        let template = self.templates.resolve(job.template_path.as_ref())?;
        let subject = job.subject.as_deref().unwrap_or(&template.subject);
        self.transport
            .send_one(&job.recipient_email, subject, &template.html)
            .await
    }
}

#[async_trait]
impl JobHandler<SendEmailJob> for SendEmailHandler {
    async fn handle(&self, job: SendEmailJob, ctx: JobContext) -> Result<SendOutcome, JobError> {
        let recipient = job.recipient_email.clone();
        let name = job.recipient_name.clone();

        if job.simulate {
            tokio::time::sleep(self.simulate_delay).await;
            info!(recipient = %recipient, "Simulated send");
            metrics::counter!("mailcast_emails_total", "outcome" => "simulated").increment(1);
            return Ok(SendOutcome::Simulated { recipient, name });
        }

        match self.deliver(&job).await {
            Ok(()) => {
                info!(recipient = %recipient, attempt = ctx.attempt, "Email delivered");
                metrics::counter!("mailcast_emails_total", "outcome" => "sent").increment(1);
                Ok(SendOutcome::Succeeded { recipient, name })
            }
            Err(e) if ctx.is_last_attempt() => {
                warn!(
                    recipient = %recipient,
                    attempt = ctx.attempt,
                    error = %e,
                    "Email delivery failed; no attempts left"
                );
                metrics::counter!("mailcast_emails_total", "outcome" => "failed").increment(1);
                Ok(SendOutcome::Failed {
                    recipient,
                    name,
                    error: e.to_string(),
                })
            }
            Err(e) => {
                warn!(
                    recipient = %recipient,
                    attempt = ctx.attempt,
                    max_attempts = ctx.max_attempts,
                    error = %e,
                    "Email delivery failed; will retry"
                );
                Err(JobError::ExecutionFailed(e.to_string()))
            }
        }
    }
}
