//! # Mailcast Dispatch
//!
//! Bulk email dispatch over the Mailcast job queue:
//! - [`SendEmailJob`]: one recipient, bounded fixed-backoff retries
//! - [`BulkDispatchJob`]: reads the recipient list and schedules one send job
//!   per recipient at offsets `0, d, 2d, ...`
//! - [`StatusService`]: point queries and bulk aggregation
//! - [`Dispatcher`]: synchronous loop or asynchronous submission

pub mod bulk;
pub mod dispatcher;
pub mod error;
pub mod send;
pub mod status;

pub use bulk::{BulkDispatchHandler, BulkDispatchJob, BulkDispatchResult, ChildJob};
pub use dispatcher::{AsyncSubmission, DispatchMode, DispatchRequest, Dispatcher, SyncReport};
pub use error::{DispatchError, DispatchResult};
pub use send::{
    SendEmailHandler, SendEmailJob, SendOutcome, TemplateSettings, SEND_MAX_ATTEMPTS,
    SEND_RETRY_BACKOFF,
};
pub use status::{BulkStatus, ChildStatus, StatusService};

use mailcast_config::AppConfig;
use mailcast_jobs::{JobQueue, WorkerPool};
use mailcast_mail::MailTransport;
use std::sync::Arc;

/// Registers the send and bulk handlers on a worker pool.
///
/// Send jobs scheduled by the bulk handler use the configured retry policy.
pub fn register_handlers<Q: JobQueue>(
    pool: &WorkerPool<Q>,
    queue: Arc<Q>,
    transport: Arc<dyn MailTransport>,
    config: &AppConfig,
) {
    pool.register::<SendEmailJob, _>(SendEmailHandler::new(transport, &config.dispatch));
    pool.register::<BulkDispatchJob, _>(
        BulkDispatchHandler::new(queue, config.dispatch.recipients_path.clone())
            .with_send_policy(config.jobs.queue.retry_policy()),
    );
}
