//! Application configuration structures.

use mailcast_core::{MailcastError, MailcastResult, TelemetryConfig};
use mailcast_jobs::JobsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Queue, worker and result backend configuration.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// SMTP relay configuration.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Dispatch defaults.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Fails unless a sender and password are configured.
    ///
    /// Only commands that talk to the SMTP relay call this.
    pub fn require_smtp_credentials(&self) -> MailcastResult<()> {
        if self.smtp.sender.trim().is_empty() {
            return Err(MailcastError::Configuration(
                "smtp.sender (EMAIL_SENDER) is required to send email".to_string(),
            ));
        }
        if self.smtp.password.is_empty() {
            return Err(MailcastError::Configuration(
                "smtp.password (EMAIL_PASSWORD) is required to send email".to_string(),
            ));
        }
        Ok(())
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Environment (development, production, ...).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "mailcast".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTlsMode {
    /// Plain connection.
    None,
    /// Upgrade with STARTTLS; the upgrade is mandatory.
    #[default]
    Starttls,
    /// Implicit TLS from the first byte.
    Tls,
}

/// SMTP relay configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host name.
    #[serde(default = "default_smtp_server")]
    pub server: String,

    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Sender address, also used as the login.
    #[serde(default)]
    pub sender: String,

    /// Login password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Transport security.
    #[serde(default)]
    pub tls_mode: SmtpTlsMode,

    /// Connection timeout in seconds.
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: default_smtp_server(),
            port: default_smtp_port(),
            sender: String::new(),
            password: String::new(),
            tls_mode: SmtpTlsMode::default(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("sender", &self.sender)
            .field("password", &"[REDACTED]")
            .field("tls_mode", &self.tls_mode)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SmtpConfig {
    /// Returns the connection timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Dispatch defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Recipient CSV file.
    #[serde(default = "default_recipients_path")]
    pub recipients_path: PathBuf,

    /// Directory holding rendered templates.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// File-name prefix of rendered templates.
    #[serde(default = "default_template_prefix")]
    pub template_prefix: String,

    /// Seconds between consecutive sends.
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,

    /// Synthetic send duration in simulate mode, in milliseconds.
    #[serde(default = "default_simulate_delay_ms")]
    pub simulate_delay_ms: u64,

    /// Subject used when the template has none.
    #[serde(default = "default_fallback_subject")]
    pub fallback_subject: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            recipients_path: default_recipients_path(),
            template_dir: default_template_dir(),
            template_prefix: default_template_prefix(),
            default_delay_secs: default_delay_secs(),
            simulate_delay_ms: default_simulate_delay_ms(),
            fallback_subject: default_fallback_subject(),
        }
    }
}

impl DispatchConfig {
    /// Synthetic send duration in simulate mode.
    pub fn simulate_delay(&self) -> Duration {
        Duration::from_millis(self.simulate_delay_ms)
    }
}

fn default_recipients_path() -> PathBuf {
    PathBuf::from("data/recipients.csv")
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_template_prefix() -> String {
    "email_template_".to_string()
}

fn default_delay_secs() -> u64 {
    5
}

fn default_simulate_delay_ms() -> u64 {
    500
}

fn default_fallback_subject() -> String {
    "Association Gamadji - Informations".to_string()
}
