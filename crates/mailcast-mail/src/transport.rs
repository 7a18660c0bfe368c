//! SMTP mail transport using lettre.

use crate::error::{MailError, MailResult};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailcast_config::{SmtpConfig, SmtpTlsMode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Plain-text part shown by clients that cannot render HTML.
pub const PLAIN_TEXT_NOTICE: &str = "Ce message contient du contenu HTML. Si vous ne le voyez pas \
correctement, veuillez utiliser un client mail compatible HTML.";

/// Sends one HTML message to one recipient.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Delivers `html` to `recipient` with the given subject.
    ///
    /// # Errors
    ///
    /// Returns `MailError` if the message is invalid or the relay rejects it.
    async fn send_one(&self, recipient: &str, subject: &str, html: &str) -> MailResult<()>;
}

/// SMTP transport that opens a fresh connection for every message.
pub struct SmtpMailer {
    server: String,
    port: u16,
    sender: Mailbox,
    login: String,
    password: SecretString,
    tls_mode: SmtpTlsMode,
    timeout: Duration,
}

impl SmtpMailer {
    /// Builds a mailer from SMTP settings.
    pub fn from_config(config: &SmtpConfig) -> MailResult<Self> {
        let sender = config
            .sender
            .parse::<Mailbox>()
            .map_err(|_| MailError::Address(config.sender.clone()))?;

        Ok(Self {
            server: config.server.clone(),
            port: config.port,
            sender,
            login: config.sender.clone(),
            password: SecretString::from(config.password.clone()),
            tls_mode: config.tls_mode,
            timeout: config.timeout(),
        })
    }

    /// Assembles the message: sender in `From`, recipient in `Bcc` only,
    /// plain-text notice plus HTML as alternatives.
    pub fn build_message(&self, recipient: &str, subject: &str, html: &str) -> MailResult<Message> {
        let to = recipient
            .parse::<Mailbox>()
            .map_err(|_| MailError::Address(recipient.to_string()))?;

        Message::builder()
            .from(self.sender.clone())
            .bcc(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(PLAIN_TEXT_NOTICE.to_string()))
                    .singlepart(SinglePart::html(html.to_string())),
            )
            .map_err(|e| MailError::Build(e.to_string()))
    }

    fn transport(&self) -> MailResult<AsyncSmtpTransport<Tokio1Executor>> {
        let tls = match self.tls_mode {
            SmtpTlsMode::None => Tls::None,
            SmtpTlsMode::Starttls => Tls::Required(self.tls_parameters()?),
            SmtpTlsMode::Tls => Tls::Wrapper(self.tls_parameters()?),
        };

        let credentials = Credentials::new(
            self.login.clone(),
            self.password.expose_secret().to_string(),
        );

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.server.as_str())
                .port(self.port)
                .timeout(Some(self.timeout))
                .tls(tls)
                .credentials(credentials)
                .build(),
        )
    }

    fn tls_parameters(&self) -> MailResult<TlsParameters> {
        TlsParameters::new(self.server.clone()).map_err(|e| MailError::Tls(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send_one(&self, recipient: &str, subject: &str, html: &str) -> MailResult<()> {
        let message = self.build_message(recipient, subject, html)?;
        let transport = self.transport()?;

        debug!(
            recipient,
            server = %self.server,
            port = self.port,
            tls_mode = ?self.tls_mode,
            "Sending email"
        );

        match transport.send(message).await {
            Ok(response) => {
                info!(recipient, code = %response.code(), "Email sent");
                Ok(())
            }
            Err(e) => {
                warn!(recipient, error = %e, "Email send failed");
                Err(MailError::Transport {
                    recipient: recipient.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Accepts every message without contacting a relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

#[async_trait]
impl MailTransport for NullTransport {
    async fn send_one(&self, recipient: &str, _subject: &str, _html: &str) -> MailResult<()> {
        debug!(recipient, "Message discarded");
        Ok(())
    }
}
