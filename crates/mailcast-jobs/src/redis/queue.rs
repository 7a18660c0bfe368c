//! Redis job queue implementation.
//!
//! Job records are JSON strings under `{prefix}:job:{id}`. Ready queues and
//! the delayed set hold job ids scored by eligibility time in milliseconds,
//! so a record is written in one place and referenced from the indexes.

use super::RedisKeys;
use crate::config::JobsConfig;
use crate::error::{JobError, JobResult};
use crate::job::{JobData, JobId, JobInfo, JobStatus};
use crate::queue::{apply_failure, JobQueue, QueueStats};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pops the lowest-scored id of a ready queue and leases it to a worker in
/// the active hash, so an id is always in one of the two.
///
/// KEYS: ready queue, active hash. ARGV: worker id.
/// Returns `{id, score}` or nil when the queue is empty.
static CLAIM_READY: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local popped = redis.call('ZPOPMIN', KEYS[1])
        if #popped == 0 then
            return false
        end
        redis.call('HSET', KEYS[2], popped[1], ARGV[1])
        return popped
        ",
    )
});

/// Moves a due id from the delayed set to its ready queue and rewrites its
/// record, only if this caller removed it from the delayed set.
///
/// KEYS: delayed set, job record, ready queue. ARGV: id, record, score.
static PROMOTE_DELAYED: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
            return 0
        end
        redis.call('SET', KEYS[2], ARGV[2])
        redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
        return 1
        ",
    )
});

/// Redis-backed job queue.
pub struct RedisJobQueue {
    pool: Pool,
    keys: RedisKeys,
    retention_secs: u64,
}

impl RedisJobQueue {
    /// Create a new Redis job queue.
    pub fn new(pool: Pool, config: &JobsConfig) -> Self {
        Self {
            pool,
            keys: RedisKeys::new(&config.redis.key_prefix),
            // SET EX rejects zero.
            retention_secs: config.queue.result_retention_secs.max(1),
        }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn load(&self, conn: &mut Connection, job_id: &str) -> JobResult<Option<JobData>> {
        let json: Option<String> = conn.get(self.keys.job(job_id)).await?;
        json.map(|j| JobData::from_json(&j)).transpose()
    }

    fn score(job: &JobData) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let score = job.scheduled_at.timestamp_millis() as f64;
        score
    }

    /// Adds the commands that store a new job and index it.
    fn stage_submit(&self, pipe: &mut redis::Pipeline, job: &JobData) -> JobResult<()> {
        let id = job.id.as_str();
        pipe.set(self.keys.job(id), job.to_json()?).ignore();
        pipe.sadd(self.keys.queues(), &job.queue).ignore();

        if job.scheduled_at > Utc::now() {
            pipe.zadd(self.keys.delayed(), id, Self::score(job)).ignore();
        } else {
            pipe.zadd(self.keys.queue(&job.queue), id, Self::score(job))
                .ignore();
        }
        Ok(())
    }

    /// Writes a terminal record with the retention expiry.
    fn stage_terminal(&self, pipe: &mut redis::Pipeline, job: &JobData) -> JobResult<()> {
        let id = job.id.as_str();
        pipe.set_ex(self.keys.job(id), job.to_json()?, self.retention_secs)
            .ignore();
        pipe.hdel(self.keys.active(), id).ignore();
        let field = if job.status == JobStatus::Succeeded {
            "succeeded"
        } else {
            "failed"
        };
        pipe.hincr(self.keys.stats(&job.queue), field, 1i64).ignore();
        Ok(())
    }

    /// Move delayed jobs whose time has come to their ready queues.
    ///
    /// The removal from the delayed set and the insertion in the ready queue
    /// happen in one script; only the caller whose `ZREM` succeeded promotes
    /// the job, so concurrent workers never promote the same job twice.
    pub async fn process_delayed(&self) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = conn.zrangebyscore(self.keys.delayed(), 0i64, now).await?;

        let mut moved = 0u64;

        for id in due {
            let Some(mut job) = self.load(&mut conn, &id).await? else {
                debug!(job_id = %id, "Dropping delayed entry without a record");
                let _: () = conn.zrem(self.keys.delayed(), &id).await?;
                continue;
            };

            if job.status == JobStatus::Retrying {
                job.status = JobStatus::Pending;
            }

            let promoted: i64 = PROMOTE_DELAYED
                .key(self.keys.delayed())
                .key(self.keys.job(&id))
                .key(self.keys.queue(&job.queue))
                .arg(&id)
                .arg(job.to_json()?)
                .arg(Self::score(&job))
                .invoke_async(&mut *conn)
                .await?;
            if promoted == 0 {
                continue;
            }

            moved += 1;
            debug!(job_id = %id, queue = %job.queue, "Moved delayed job to queue");
        }

        if moved > 0 {
            debug!(count = moved, "Processed delayed jobs");
        }

        Ok(moved)
    }

    /// Counters and current sizes for one queue.
    pub async fn stats(&self, queue: &str) -> JobResult<QueueStats> {
        let mut conn = self.conn().await?;
        let pending: u64 = conn.zcard(self.keys.queue(queue)).await?;
        let counters: HashMap<String, u64> = conn.hgetall(self.keys.stats(queue)).await?;

        let active_map: HashMap<String, String> = conn.hgetall(self.keys.active()).await?;
        let mut active = 0u64;
        for id in active_map.keys() {
            if let Some(job) = self.load(&mut conn, id).await? {
                if job.queue == queue {
                    active += 1;
                }
            }
        }

        Ok(QueueStats {
            queue: queue.to_string(),
            pending,
            active,
            succeeded: counters.get("succeeded").copied().unwrap_or(0),
            failed: counters.get("failed").copied().unwrap_or(0),
            retried: counters.get("retried").copied().unwrap_or(0),
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn submit(&self, job: JobData) -> JobResult<JobId> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.stage_submit(&mut pipe, &job)?;
        let _: () = pipe.query_async(&mut *conn).await?;

        debug!(
            job_id = %job.id,
            queue = %job.queue,
            scheduled_at = %job.scheduled_at,
            "Enqueued job"
        );

        Ok(job.id)
    }

    async fn submit_batch(&self, jobs: Vec<JobData>) -> JobResult<Vec<JobId>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for job in &jobs {
            self.stage_submit(&mut pipe, job)?;
        }
        let _: () = pipe.query_async(&mut *conn).await?;

        debug!(count = jobs.len(), "Enqueued job batch");

        Ok(jobs.into_iter().map(|j| j.id).collect())
    }

    async fn dequeue(&self, queues: &[String], worker_id: &str) -> JobResult<Option<JobData>> {
        self.process_delayed().await?;

        let mut conn = self.conn().await?;

        for queue_name in queues {
            let queue_key = self.keys.queue(queue_name);

            loop {
                let claimed: Option<(String, f64)> = CLAIM_READY
                    .key(&queue_key)
                    .key(self.keys.active())
                    .arg(worker_id)
                    .invoke_async(&mut *conn)
                    .await?;
                let Some((id, score)) = claimed else {
                    break;
                };

                let Some(mut job) = self.load(&mut conn, &id).await? else {
                    debug!(job_id = %id, "Skipping queue entry without a record");
                    let _: () = conn.hdel(self.keys.active(), &id).await?;
                    continue;
                };

                if job.status.is_terminal() {
                    let _: () = conn.hdel(self.keys.active(), &id).await?;
                    continue;
                }

                job.start_attempt(worker_id);

                let written: redis::RedisResult<()> =
                    conn.set(self.keys.job(&id), job.to_json()?).await;
                if let Err(e) = written {
                    // Release the lease; the job must stay reachable.
                    let released: redis::RedisResult<()> = redis::pipe()
                        .atomic()
                        .zadd(&queue_key, &id, score)
                        .ignore()
                        .hdel(self.keys.active(), &id)
                        .ignore()
                        .query_async(&mut *conn)
                        .await;
                    if let Err(release_err) = released {
                        warn!(job_id = %id, error = %release_err, "Failed to release claimed job");
                    }
                    return Err(e.into());
                }

                debug!(
                    job_id = %job.id,
                    queue = %job.queue,
                    attempt = job.attempt,
                    worker_id = %worker_id,
                    "Dequeued job"
                );

                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    async fn complete(
        &self,
        job_id: &JobId,
        result: serde_json::Value,
        success: bool,
    ) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let mut job = self
            .load(&mut conn, job_id.as_str())
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        job.finish(Some(result), success);

        let mut pipe = redis::pipe();
        pipe.atomic();
        self.stage_terminal(&mut pipe, &job)?;
        let _: () = pipe.query_async(&mut *conn).await?;

        debug!(job_id = %job_id, status = %job.status, "Completed job");

        Ok(())
    }

    async fn fail(&self, job_id: &JobId, error: &JobError) -> JobResult<JobStatus> {
        let mut conn = self.conn().await?;
        let mut job = self
            .load(&mut conn, job_id.as_str())
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let status = apply_failure(&mut job, error);

        if status == JobStatus::Retrying {
            self.retry(&job).await?;
        } else {
            let mut pipe = redis::pipe();
            pipe.atomic();
            self.stage_terminal(&mut pipe, &job)?;
            let _: () = pipe.query_async(&mut *conn).await?;

            warn!(
                job_id = %job_id,
                error = %error,
                attempts = job.attempt,
                "Job failed permanently"
            );
        }

        Ok(status)
    }

    async fn retry(&self, job_data: &JobData) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let id = job_data.id.as_str();

        let mut job = job_data.clone();
        job.status = JobStatus::Retrying;
        job.worker_id = None;

        let _: () = redis::pipe()
            .atomic()
            .set(self.keys.job(id), job.to_json()?)
            .ignore()
            .zadd(self.keys.delayed(), id, Self::score(&job))
            .ignore()
            .hdel(self.keys.active(), id)
            .ignore()
            .hincr(self.keys.stats(&job.queue), "retried", 1i64)
            .ignore()
            .query_async(&mut *conn)
            .await?;

        debug!(
            job_id = %job.id,
            attempt = job.attempt,
            retry_at = %job.scheduled_at,
            "Scheduled job retry"
        );

        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobInfo>> {
        let mut conn = self.conn().await?;
        Ok(self
            .load(&mut conn, job_id.as_str())
            .await?
            .map(JobInfo::from))
    }

    async fn list_active(&self, limit: usize) -> JobResult<Vec<JobInfo>> {
        let mut conn = self.conn().await?;

        let mut ids: Vec<String> = conn.hkeys(self.keys.active()).await?;
        let queues: Vec<String> = conn.smembers(self.keys.queues()).await?;
        for queue in queues {
            let ready: Vec<String> = conn.zrange(self.keys.queue(&queue), 0, -1).await?;
            ids.extend(ready);
        }
        let delayed: Vec<String> = conn.zrange(self.keys.delayed(), 0, -1).await?;
        ids.extend(delayed);

        let mut infos = Vec::new();
        for id in ids {
            if infos.len() >= limit {
                break;
            }
            if let Some(job) = self.load(&mut conn, &id).await? {
                if !job.status.is_terminal() {
                    infos.push(JobInfo::from(job));
                }
            }
        }

        Ok(infos)
    }

    async fn queue_length(&self, queue: &str) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        let count: u64 = conn.zcard(self.keys.queue(queue)).await?;
        Ok(count)
    }

    async fn cancel(&self, job_id: &JobId) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let mut job = self
            .load(&mut conn, job_id.as_str())
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if job.status == JobStatus::Running || job.status.is_terminal() {
            return Err(JobError::InvalidState {
                expected: "pending".to_string(),
                actual: job.status.to_string(),
            });
        }

        job.set_error(&JobError::Cancelled);
        job.finish(None, false);

        let id = job_id.as_str();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zrem(self.keys.queue(&job.queue), id).ignore();
        pipe.zrem(self.keys.delayed(), id).ignore();
        self.stage_terminal(&mut pipe, &job)?;
        let _: () = pipe.query_async(&mut *conn).await?;

        info!(job_id = %job_id, "Cancelled job");

        Ok(())
    }

    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(
                self.keys.worker(worker_id),
                Utc::now().to_rfc3339(),
                ttl.as_secs().max(1),
            )
            .await?;
        Ok(())
    }

    async fn live_workers(&self) -> JobResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = self.keys.worker_pattern();

        let mut workers = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;

            workers.extend(
                keys.iter()
                    .filter_map(|k| self.keys.worker_id_from_key(k))
                    .map(str::to_string),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(workers)
    }

    async fn recover_stale_jobs(&self) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        let active: HashMap<String, String> = conn.hgetall(self.keys.active()).await?;

        let mut recovered = 0u64;

        for (job_id, worker_id) in active {
            let alive: bool = conn.exists(self.keys.worker(&worker_id)).await?;
            if alive {
                continue;
            }

            let id = JobId::from(job_id.as_str());
            match self.fail(&id, &JobError::Worker("worker lost".to_string())).await {
                Ok(status) => {
                    recovered += 1;
                    warn!(
                        job_id = %job_id,
                        worker_id = %worker_id,
                        status = %status,
                        "Recovered stale job from dead worker"
                    );
                }
                Err(JobError::NotFound(_)) => {
                    let _: () = conn.hdel(self.keys.active(), &job_id).await?;
                }
                Err(e) => return Err(e),
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered stale jobs");
        }

        Ok(recovered)
    }

    async fn health_check(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}
