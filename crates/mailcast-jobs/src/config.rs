//! Job queue configuration.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// Configuration for the job queue system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Redis connection configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Key prefix for all job-related keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisConfig {
    /// Builds a URL from host/port/db parts.
    pub fn url_from_parts(host: &str, port: u16, db: u32) -> String {
        format!("redis://{host}:{port}/{db}")
    }

    /// Returns connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "mailcast:jobs".to_string()
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum jobs executing at once in one pool.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Jobs processed before the pool asks to be recycled (0 = never).
    #[serde(default = "default_max_jobs_per_worker")]
    pub max_jobs_per_worker: u64,

    /// Jobs started per minute (0 = unlimited).
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Job execution timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Polling interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Heartbeat interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_jobs_per_worker: default_max_jobs_per_worker(),
            rate_limit_per_minute: default_rate_limit(),
            job_timeout_secs: default_job_timeout(),
            poll_interval_ms: default_poll_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

fn default_concurrency() -> usize {
    2
}

fn default_max_jobs_per_worker() -> u64 {
    50
}

fn default_rate_limit() -> u32 {
    10
}

fn default_job_timeout() -> u64 {
    300 // 5 minutes
}

fn default_poll_interval() -> u64 {
    200
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl WorkerConfig {
    /// Returns job timeout as Duration.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Returns poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Returns shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns heartbeat interval as Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Heartbeat keys live for three intervals so one missed beat is tolerated.
    pub fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_interval() * 3
    }

    /// Rate limit as a non-zero quota, `None` when unlimited.
    pub fn rate_limit(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.rate_limit_per_minute)
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long terminal job records stay queryable, in seconds.
    #[serde(default = "default_retention")]
    pub result_retention_secs: u64,

    /// Total attempts for retried jobs.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed backoff between attempts, in seconds.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            result_retention_secs: default_retention(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

fn default_retention() -> u64 {
    3600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    60
}

impl QueueConfig {
    /// Returns result retention as Duration.
    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }

    /// Fixed-backoff policy built from the configured attempts and backoff.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.max_attempts,
            Duration::from_secs(self.retry_backoff_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JobsConfig::default();
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.worker.max_jobs_per_worker, 50);
        assert_eq!(config.worker.rate_limit_per_minute, 10);
        assert_eq!(config.queue.result_retention_secs, 3600);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.retry_backoff_secs, 60);
        assert_eq!(config.redis.key_prefix, "mailcast:jobs");
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: JobsConfig =
            serde_json::from_str(r#"{"worker":{"concurrency":4}}"#).unwrap();
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.job_timeout_secs, 300);
        assert_eq!(config.redis.url, "redis://localhost:6379/0");
    }

    #[test]
    fn test_retry_policy_from_queue_config() {
        let policy = QueueConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_rate_limit_is_unlimited() {
        let worker = WorkerConfig {
            rate_limit_per_minute: 0,
            ..WorkerConfig::default()
        };
        assert!(worker.rate_limit().is_none());
    }

    #[test]
    fn test_url_from_parts() {
        assert_eq!(
            RedisConfig::url_from_parts("cache", 6380, 2),
            "redis://cache:6380/2"
        );
    }
}
