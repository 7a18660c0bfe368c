//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use mailcast_core::{MailcastError, MailcastResult};
use mailcast_jobs::RedisConfig;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Plain environment keys understood for compatibility with existing
/// `.env` files, mapped to their configuration paths.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("SMTP_SERVER", "smtp.server"),
    ("SMTP_PORT", "smtp.port"),
    ("EMAIL_SENDER", "smtp.sender"),
    ("EMAIL_PASSWORD", "smtp.password"),
];

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{MAILCAST_ENVIRONMENT}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. `SMTP_*`, `EMAIL_*` and `REDIS_*` variables, usually from `.env`
    /// 5. Environment variables with `MAILCAST__` prefix
    pub fn new(config_dir: impl Into<String>) -> MailcastResult<Self> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> MailcastResult<Self> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> MailcastResult<()> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> MailcastResult<AppConfig> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("MAILCAST_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let app_config = build_config(config_dir, &environment, |key| std::env::var(key).ok())?;
        validate_config(&app_config);
        Ok(app_config)
    }
}

/// Assembles the layered configuration. `lookup` resolves legacy keys.
fn build_config(
    config_dir: &str,
    environment: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> MailcastResult<AppConfig> {
    let mut builder = Config::builder();

    // 1-3. Files
    for name in ["default", environment, "local"] {
        let path = format!("{config_dir}/{name}.toml");
        if Path::new(&path).exists() {
            debug!("Loading config from: {}", path);
            builder = builder.add_source(File::with_name(&path).required(false));
        }
    }

    // 4. Legacy keys
    builder = builder.add_source(legacy_source(&lookup)?);

    // 5. Override with environment variables (MAILCAST__ prefix)
    builder = builder.add_source(
        Environment::with_prefix("MAILCAST")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build().map_err(config_error_to_mailcast_error)?;

    let mut app_config: AppConfig = config
        .try_deserialize()
        .map_err(config_error_to_mailcast_error)?;
    app_config.app.environment = environment.to_string();

    Ok(app_config)
}

/// Maps legacy variables onto configuration paths.
fn legacy_source(lookup: &impl Fn(&str) -> Option<String>) -> MailcastResult<Config> {
    let mut legacy = Config::builder();

    for (key, path) in LEGACY_KEYS {
        legacy = legacy
            .set_override_option(*path, lookup(key))
            .map_err(config_error_to_mailcast_error)?;
    }

    let host = lookup("REDIS_HOST");
    let port = lookup("REDIS_PORT");
    let db = lookup("REDIS_DB");
    if host.is_some() || port.is_some() || db.is_some() {
        let port = parse_or(port.as_deref(), 6379, "REDIS_PORT")?;
        let db = parse_or(db.as_deref(), 0, "REDIS_DB")?;
        let host = host.unwrap_or_else(|| "localhost".to_string());
        legacy = legacy
            .set_override("jobs.redis.url", RedisConfig::url_from_parts(&host, port, db))
            .map_err(config_error_to_mailcast_error)?;
    }

    legacy.build().map_err(config_error_to_mailcast_error)
}

fn parse_or<T: std::str::FromStr>(value: Option<&str>, default: T, key: &str) -> MailcastResult<T> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| MailcastError::Configuration(format!("{key} is not a valid number: {v}"))),
        None => Ok(default),
    }
}

/// Warns about settings that are legal but probably unintended.
fn validate_config(config: &AppConfig) {
    if config.jobs.worker.concurrency == 0 {
        warn!("jobs.worker.concurrency is 0; a single slot will be used");
    }
    if config.jobs.queue.max_attempts == 0 {
        warn!("jobs.queue.max_attempts is 0; jobs will run once without retries");
    }
}

fn config_error_to_mailcast_error(err: ConfigError) -> MailcastError {
    MailcastError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SmtpTlsMode;
    use std::collections::HashMap;
    use std::fs;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_config(dir.path().to_str().unwrap(), "test", no_env).unwrap();
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.jobs.worker.concurrency, 2);
        assert_eq!(config.app.environment, "test");
    }

    #[test]
    fn test_environment_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[smtp]\nserver = \"mail.example.org\"\nport = 25\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("production.toml"),
            "[smtp]\nport = 465\ntls_mode = \"tls\"\n",
        )
        .unwrap();

        let config = build_config(dir.path().to_str().unwrap(), "production", no_env).unwrap();
        assert_eq!(config.smtp.server, "mail.example.org");
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.tls_mode, SmtpTlsMode::Tls);
    }

    #[test]
    fn test_legacy_keys_override_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[smtp]\nport = 25\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("SMTP_PORT", "2525"),
            ("EMAIL_SENDER", "asso@example.org"),
            ("EMAIL_PASSWORD", "secret"),
            ("REDIS_HOST", "cache"),
            ("REDIS_DB", "3"),
        ]
        .into_iter()
        .collect();

        let config = build_config(dir.path().to_str().unwrap(), "development", |k| {
            env.get(k).map(|v| (*v).to_string())
        })
        .unwrap();

        assert_eq!(config.smtp.port, 2525);
        assert_eq!(config.smtp.sender, "asso@example.org");
        assert_eq!(config.smtp.password, "secret");
        assert_eq!(config.jobs.redis.url, "redis://cache:6379/3");
    }

    #[test]
    fn test_invalid_legacy_port_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_config(dir.path().to_str().unwrap(), "development", |k| {
            (k == "REDIS_PORT").then(|| "abc".to_string())
        });
        assert!(matches!(result, Err(MailcastError::Configuration(_))));
    }
}
