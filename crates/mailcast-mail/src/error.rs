//! Error types for the mail collaborators.

use mailcast_core::MailcastError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the transport, template loader and recipient store.
#[derive(Error, Debug)]
pub enum MailError {
    /// The SMTP exchange failed.
    #[error("SMTP send to {recipient} failed: {message}")]
    Transport { recipient: String, message: String },

    /// An address could not be parsed as a mailbox.
    #[error("Invalid address: {0}")]
    Address(String),

    /// The MIME message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(String),

    /// TLS parameters could not be created.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// No rendered template matched.
    #[error("No template matching {prefix}*.html in {dir}")]
    TemplateNotFound { dir: PathBuf, prefix: String },

    /// The recipient file does not exist.
    #[error("Recipient file not found: {0}")]
    RecipientsNotFound(PathBuf),

    /// The recipient file lacks a required column.
    #[error("Recipient file {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },

    /// A recipient failed validation.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The address is already present (case-insensitive).
    #[error("Recipient already exists: {0}")]
    DuplicateRecipient(String),

    /// No recipient at that position.
    #[error("No recipient at position {index} (list has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// CSV read or write failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

impl From<MailError> for MailcastError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Transport { .. } => MailcastError::external("smtp", err.to_string()),
            MailError::TemplateNotFound { .. } | MailError::RecipientsNotFound(_) => {
                MailcastError::Configuration(err.to_string())
            }
            MailError::DuplicateRecipient(_) => MailcastError::conflict(err.to_string()),
            MailError::Address(_)
            | MailError::InvalidRecipient(_)
            | MailError::MissingColumn { .. }
            | MailError::IndexOutOfRange { .. } => MailcastError::validation(err.to_string()),
            MailError::Io(io) => MailcastError::Io(io),
            MailError::Build(_) | MailError::Tls(_) | MailError::Csv(_) => {
                MailcastError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_transient() {
        let err: MailcastError = MailError::Transport {
            recipient: "a@example.org".into(),
            message: "421".into(),
        }
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let err: MailcastError = MailError::DuplicateRecipient("a@example.org".into()).into();
        assert_eq!(err.error_code(), "CONFLICT");
    }
}
