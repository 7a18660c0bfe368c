//! Dispatch error types.

use mailcast_core::MailcastError;
use mailcast_jobs::JobError;
use mailcast_mail::MailError;
use thiserror::Error;

/// Dispatch errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The queue backend failed its preflight check.
    #[error("Queue backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The synchronous loop stopped at the first failed send.
    #[error("Synchronous dispatch aborted after {sent} sent, at {recipient}: {source}")]
    SyncAborted {
        sent: usize,
        recipient: String,
        #[source]
        source: MailError,
    },

    /// The handle does not carry a bulk dispatch manifest.
    #[error("Job {0} is not a bulk dispatch job")]
    NotABulkJob(String),

    /// Recipient store, template or transport failure.
    #[error(transparent)]
    Mail(#[from] MailError),

    /// Queue operation failure.
    #[error(transparent)]
    Jobs(#[from] JobError),
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<DispatchError> for MailcastError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::BackendUnavailable(message) => MailcastError::external("queue", message),
            DispatchError::SyncAborted { .. } => MailcastError::external("smtp", err.to_string()),
            DispatchError::NotABulkJob(_) => MailcastError::validation(err.to_string()),
            DispatchError::Mail(e) => e.into(),
            DispatchError::Jobs(e) => e.into(),
        }
    }
}
