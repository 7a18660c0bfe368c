//! Redis-backed job queue implementation.

mod queue;

pub use queue::RedisJobQueue;

use crate::config::RedisConfig;
use crate::error::{JobError, JobResult};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Create a Redis connection pool and verify it with a PING.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!(url = %config.url, "Creating Redis connection pool for job queue...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {e}")))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {e}")))?;

    tokio::time::timeout(config.connect_timeout(), async {
        let mut conn = pool.get().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok::<_, JobError>(())
    })
    .await
    .map_err(|_| JobError::Timeout(config.connect_timeout_secs))??;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis key builder for job queue.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Ready queue key (sorted set of job ids by eligibility time).
    pub fn queue(&self, queue_name: &str) -> String {
        format!("{}:queue:{}", self.prefix, queue_name)
    }

    /// Known queue names (set).
    pub fn queues(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    /// Delayed jobs key (sorted set of job ids by eligibility time).
    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.prefix)
    }

    /// Active jobs key (hash: job_id -> worker_id).
    pub fn active(&self) -> String {
        format!("{}:active", self.prefix)
    }

    /// Job record key (JSON string).
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// Worker heartbeat key.
    pub fn worker(&self, worker_id: &str) -> String {
        format!("{}:worker:{}", self.prefix, worker_id)
    }

    /// Pattern matching every worker heartbeat key.
    pub fn worker_pattern(&self) -> String {
        format!("{}:worker:*", self.prefix)
    }

    /// Extracts the worker id from a heartbeat key.
    pub fn worker_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix(":worker:"))
    }

    /// Stats key.
    pub fn stats(&self, queue_name: &str) -> String {
        format!("{}:stats:{}", self.prefix, queue_name)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("mailcast:jobs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_keys() {
        let keys = RedisKeys::new("test");

        assert_eq!(keys.queue("email_queue"), "test:queue:email_queue");
        assert_eq!(keys.job("123"), "test:job:123");
        assert_eq!(keys.delayed(), "test:delayed");
        assert_eq!(keys.worker("w1"), "test:worker:w1");
        assert_eq!(keys.worker_pattern(), "test:worker:*");
    }

    #[test]
    fn test_worker_id_from_key() {
        let keys = RedisKeys::default();
        assert_eq!(
            keys.worker_id_from_key("mailcast:jobs:worker:host-1-abc"),
            Some("host-1-abc")
        );
        assert_eq!(keys.worker_id_from_key("other:worker:x"), None);
    }
}
