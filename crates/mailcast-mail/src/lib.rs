//! # Mailcast Mail
//!
//! Collaborators used by dispatch:
//! - [`MailTransport`] / [`SmtpMailer`]: one message per call over a fresh SMTP connection
//! - [`LoadedTemplate`]: newest rendered template and its subject line
//! - [`RecipientStore`]: the `name,email` CSV recipient list

pub mod error;
pub mod recipients;
pub mod template;
pub mod transport;

pub use error::{MailError, MailResult};
pub use recipients::{ImportReport, Recipient, RecipientList, RecipientStore};
pub use template::{extract_subject, latest_template, LoadedTemplate};
pub use transport::{MailTransport, NullTransport, SmtpMailer, PLAIN_TEXT_NOTICE};
