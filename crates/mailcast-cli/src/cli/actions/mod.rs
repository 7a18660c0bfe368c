pub mod dispatch;
pub mod recipients;
pub mod status;
pub mod test_email;
pub mod worker;

mod run;

use anyhow::{Context, Result};
use mailcast_config::{AppConfig, ConfigLoader};
use mailcast_core::init_tracing;
use mailcast_jobs::{create_pool, RedisJobQueue};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub enum Action {
    Dispatch(dispatch::Args),
    Status(status::Args),
    Worker(worker::Args),
    Recipients(recipients::Args),
    TestEmail(test_email::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Loads the layered configuration and installs the tracing subscriber.
async fn load_config(config_dir: &Path) -> Result<(ConfigLoader, AppConfig)> {
    let loader = ConfigLoader::new(config_dir.to_string_lossy())
        .with_context(|| format!("failed to load configuration from {}", config_dir.display()))?;
    let config = loader.get().await;
    init_tracing(&config.telemetry).context("failed to initialise logging")?;
    Ok((loader, config))
}

/// Connects to the Redis job backend.
async fn connect_queue(config: &AppConfig) -> Result<Arc<RedisJobQueue>> {
    let pool = create_pool(&config.jobs.redis).await.with_context(|| {
        format!(
            "job backend unavailable at {}; start Redis or set jobs.redis.url",
            config.jobs.redis.url
        )
    })?;
    Ok(Arc::new(RedisJobQueue::new(pool, &config.jobs)))
}

/// Asks a yes/no question on the terminal. Anything but yes declines.
fn confirm(question: &str) -> Result<bool> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "{question} [y/N] ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "o" | "oui"
    )
}
