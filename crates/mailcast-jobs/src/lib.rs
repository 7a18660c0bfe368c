//! Mailcast Jobs - Job Queue & Result Backend
//!
//! A Redis-backed job queue with:
//! - Typed job definitions with serde serialization
//! - Handlers that receive explicit retry state through [`JobContext`]
//! - Delayed eligibility and fixed/exponential/linear retry backoff
//! - Worker pools with bounded concurrency, rate limiting and recycling
//! - Result records that expire after a retention window
//! - Status queries that report expired handles as unknown
//!
//! # Architecture
//!
//! ```text
//!  Producer ──submit──▶ ┌──────────────────────────────┐
//!                       │  delayed (by eligibility)    │
//!                       │        │ promote when due    │
//!                       │        ▼                     │
//!                       │  ready queue per job queue   │
//!                       └────────┬─────────────────────┘
//!                                │ dequeue (lease to worker)
//!                                ▼
//!                       ┌──────────────────────────────┐
//!                       │  WorkerPool                  │
//!                       │  semaphore ─ rate limiter    │
//!                       │  heartbeat ─ stale recovery  │
//!                       └────────┬─────────────────────┘
//!              retry (same id)   │   complete / fail
//!           ◀────────────────────┤
//!                                ▼
//!                       job record (status, result, EX retention)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use mailcast_jobs::{Job, JobContext, JobError, JobHandler, WorkerPool};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Ping { target: String }
//!
//! impl Job for Ping {
//!     const NAME: &'static str = "ping";
//!     type Output = String;
//! }
//!
//! struct PingHandler;
//!
//! #[async_trait::async_trait]
//! impl JobHandler<Ping> for PingHandler {
//!     async fn handle(&self, job: Ping, _ctx: JobContext) -> Result<String, JobError> {
//!         Ok(format!("pong {}", job.target))
//!     }
//! }
//!
//! let id = queue.enqueue(Ping { target: "a".into() }).await?;
//! pool.register(PingHandler);
//! pool.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod redis;
pub mod retry;
pub mod status;
pub mod worker;

pub use config::{JobsConfig, QueueConfig, RedisConfig, WorkerConfig};
pub use error::{JobError, JobResult};
pub use job::{Job, JobContext, JobData, JobHandler, JobId, JobInfo, JobStatus};
pub use memory::InMemoryJobQueue;
pub use crate::metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use queue::{JobQueue, QueueStats, QueuedJob};
pub use crate::redis::{create_pool, RedisJobQueue};
pub use retry::{RetryPolicy, RetryStrategy};
pub use status::{JobState, JobStatusReport, JobStatusTracker, StateCounts};
pub use worker::{HandlerOutput, WorkerExit, WorkerPool, WorkerPoolConfig, WorkerPoolStats};

/// Re-export commonly used traits
pub mod prelude {
    pub use crate::job::{Job, JobHandler, JobStatus};
    pub use crate::queue::JobQueue;
    pub use crate::retry::RetryPolicy;
    pub use crate::{JobContext, JobError, JobId, JobResult};
}
