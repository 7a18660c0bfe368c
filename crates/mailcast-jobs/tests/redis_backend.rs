//! Lease handling of the Redis backend.
//!
//! Needs a disposable server: `MAILCAST_TEST_REDIS_URL=redis://127.0.0.1:6379
//! cargo test -p mailcast-jobs --test redis_backend -- --ignored`.

use mailcast_jobs::{
    create_pool, Job, JobQueue, JobStatus, JobsConfig, RedisConfig, RedisJobQueue, RetryPolicy,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct Deliver {
    to: String,
}

impl Job for Deliver {
    const NAME: &'static str = "deliver";
    const QUEUE: &'static str = "mail";
    type Output = ();

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::ZERO)
    }
}

fn mail() -> Vec<String> {
    vec!["mail".to_string()]
}

async fn backend() -> (RedisJobQueue, deadpool_redis::Pool, String) {
    let url = std::env::var("MAILCAST_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let prefix = format!("mailcast-test:{}", uuid::Uuid::new_v4());
    let config = JobsConfig {
        redis: RedisConfig {
            url,
            key_prefix: prefix.clone(),
            ..RedisConfig::default()
        },
        ..JobsConfig::default()
    };
    let pool = create_pool(&config.redis).await.unwrap();
    (RedisJobQueue::new(pool.clone(), &config), pool, prefix)
}

#[tokio::test]
#[ignore = "needs a Redis server"]
async fn dequeue_leases_the_job_to_the_worker() {
    let (queue, pool, prefix) = backend().await;
    let id = queue
        .enqueue(Deliver {
            to: "awa@example.org".into(),
        })
        .await
        .unwrap();

    let job = queue.dequeue(&mail(), "worker-a").await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Running);

    let mut conn = pool.get().await.unwrap();
    let ready: u64 = conn.zcard(format!("{prefix}:queue:mail")).await.unwrap();
    let holder: Option<String> = conn
        .hget(format!("{prefix}:active"), id.as_str())
        .await
        .unwrap();
    assert_eq!(ready, 0);
    assert_eq!(holder.as_deref(), Some("worker-a"));
}

#[tokio::test]
#[ignore = "needs a Redis server"]
async fn claim_interrupted_before_record_update_is_recovered() {
    let (queue, pool, prefix) = backend().await;
    let id = queue
        .enqueue(Deliver {
            to: "moussa@example.org".into(),
        })
        .await
        .unwrap();

    // The state left by a worker that died right after claiming.
    let mut conn = pool.get().await.unwrap();
    let _: Vec<(String, f64)> = conn
        .zpopmin(format!("{prefix}:queue:mail"), 1)
        .await
        .unwrap();
    let _: () = conn
        .hset(format!("{prefix}:active"), id.as_str(), "ghost")
        .await
        .unwrap();
    assert_eq!(
        queue.get_job(&id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    assert_eq!(queue.recover_stale_jobs().await.unwrap(), 1);

    let job = queue.dequeue(&mail(), "worker-b").await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.worker_id.as_deref(), Some("worker-b"));
}

#[tokio::test]
#[ignore = "needs a Redis server"]
async fn retried_job_returns_to_pending_once_due() {
    let (queue, _pool, _prefix) = backend().await;
    let id = queue
        .enqueue(Deliver {
            to: "fatou@example.org".into(),
        })
        .await
        .unwrap();

    queue.dequeue(&mail(), "worker-a").await.unwrap().unwrap();
    let status = queue
        .fail(&id, &mailcast_jobs::JobError::ExecutionFailed("421".into()))
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Retrying);

    queue.process_delayed().await.unwrap();
    assert_eq!(
        queue.get_job(&id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
}
