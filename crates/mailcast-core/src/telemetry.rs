//! Tracing subscriber initialisation.

use crate::{MailcastError, MailcastResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,mailcast=debug";

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Filter directives used when `RUST_LOG` is not set.
    #[serde(default)]
    pub filter: Option<String>,

    /// Include the event target in each line.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_with_target() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: None,
            with_target: default_with_target(),
        }
    }
}

impl TelemetryConfig {
    /// Returns the filter directives to use when `RUST_LOG` is absent.
    #[must_use]
    pub fn filter_directives(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_FILTER)
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_tracing(config: &TelemetryConfig) -> MailcastResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))
        .map_err(|e| MailcastError::Configuration(format!("Invalid log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()
    };

    result.map_err(|e| MailcastError::Internal(format!("Failed to install subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert!(!config.json);
        assert!(config.with_target);
        assert_eq!(config.filter_directives(), "info,mailcast=debug");
    }

    #[test]
    fn test_custom_filter() {
        let config = TelemetryConfig {
            filter: Some("warn".to_string()),
            ..TelemetryConfig::default()
        };
        assert_eq!(config.filter_directives(), "warn");
    }
}
