//! In-process job queue.
//!
//! Mirrors the Redis backend's semantics (eligibility times, retry
//! rescheduling, terminal-record retention, heartbeats) behind a single
//! lock. Used by tests and by single-process runs that do not need a
//! durable broker.

use crate::error::{JobError, JobResult};
use crate::job::{JobData, JobId, JobInfo, JobStatus};
use crate::queue::{apply_failure, JobQueue, QueueStats};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct Entry {
    job: JobData,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Entry>,
    workers: HashMap<String, Instant>,
    stats: HashMap<String, QueueStats>,
}

impl State {
    /// Drops expired records and workers, and returns retried jobs whose
    /// backoff has elapsed to `Pending`.
    fn refresh(&mut self, now: Instant) {
        self.jobs
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
        self.workers.retain(|_, at| *at > now);

        let due = Utc::now();
        for entry in self.jobs.values_mut() {
            if entry.job.status == JobStatus::Retrying && entry.job.scheduled_at <= due {
                entry.job.status = JobStatus::Pending;
            }
        }
    }

    fn stats_mut(&mut self, queue: &str) -> &mut QueueStats {
        self.stats
            .entry(queue.to_string())
            .or_insert_with(|| QueueStats {
                queue: queue.to_string(),
                ..QueueStats::default()
            })
    }

    fn record_terminal(&mut self, job: JobData, retention: Duration) {
        let field = job.status;
        let stats = self.stats_mut(&job.queue);
        if field == JobStatus::Succeeded {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
        self.jobs.insert(
            job.id.clone(),
            Entry {
                job,
                expires_at: Some(Instant::now() + retention),
            },
        );
    }
}

/// In-memory job queue.
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    retention: Duration,
    submitted: AtomicU64,
    offline: AtomicBool,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    /// Creates a queue with the default one hour result retention.
    pub fn new() -> Self {
        Self::with_retention(Duration::from_secs(3600))
    }

    /// Creates a queue keeping terminal records for `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            retention,
            submitted: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Number of jobs accepted by `submit` and `submit_batch` so far.
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Copies of every stored, unexpired job record ordered by creation.
    pub fn snapshot(&self) -> Vec<JobData> {
        let mut state = self.state.lock();
        state.refresh(Instant::now());
        let mut jobs: Vec<JobData> = state.jobs.values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Makes the backend refuse submissions and fail health checks.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Counters and current sizes for one queue.
    pub fn stats(&self, queue: &str) -> QueueStats {
        let mut state = self.state.lock();
        state.refresh(Instant::now());
        let now = Utc::now();

        let mut stats = state.stats.get(queue).cloned().unwrap_or_else(|| QueueStats {
            queue: queue.to_string(),
            ..QueueStats::default()
        });
        stats.pending = 0;
        stats.active = 0;
        for entry in state.jobs.values().filter(|e| e.job.queue == queue) {
            match entry.job.status {
                JobStatus::Running => stats.active += 1,
                JobStatus::Pending if entry.job.scheduled_at <= now => stats.pending += 1,
                _ => {}
            }
        }
        stats
    }

    fn ensure_online(&self) -> JobResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(JobError::Internal("queue backend is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn submit(&self, job: JobData) -> JobResult<JobId> {
        self.ensure_online()?;
        let id = job.id.clone();
        debug!(job_id = %id, queue = %job.queue, scheduled_at = %job.scheduled_at, "Enqueued job");
        self.state.lock().jobs.insert(
            id.clone(),
            Entry {
                job,
                expires_at: None,
            },
        );
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn submit_batch(&self, jobs: Vec<JobData>) -> JobResult<Vec<JobId>> {
        self.ensure_online()?;
        let count = jobs.len() as u64;
        let mut state = self.state.lock();
        let ids = jobs
            .into_iter()
            .map(|job| {
                let id = job.id.clone();
                state.jobs.insert(
                    id.clone(),
                    Entry {
                        job,
                        expires_at: None,
                    },
                );
                id
            })
            .collect();
        drop(state);
        self.submitted.fetch_add(count, Ordering::SeqCst);
        debug!(count, "Enqueued job batch");
        Ok(ids)
    }

    async fn dequeue(&self, queues: &[String], worker_id: &str) -> JobResult<Option<JobData>> {
        let mut state = self.state.lock();
        state.refresh(Instant::now());
        let now = Utc::now();

        // Earliest eligible job of the first queue that has one.
        let next = queues.iter().find_map(|queue| {
            state
                .jobs
                .values()
                .filter(|e| {
                    e.job.queue == *queue
                        && e.job.status == JobStatus::Pending
                        && e.job.scheduled_at <= now
                })
                .min_by_key(|e| e.job.scheduled_at)
                .map(|e| e.job.id.clone())
        });

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(entry) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };

        entry.job.start_attempt(worker_id);
        debug!(
            job_id = %id,
            queue = %entry.job.queue,
            attempt = entry.job.attempt,
            worker_id = %worker_id,
            "Dequeued job"
        );
        Ok(Some(entry.job.clone()))
    }

    async fn complete(
        &self,
        job_id: &JobId,
        result: serde_json::Value,
        success: bool,
    ) -> JobResult<()> {
        let mut state = self.state.lock();
        let mut job = state
            .jobs
            .remove(job_id)
            .map(|e| e.job)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.finish(Some(result), success);
        debug!(job_id = %job_id, status = %job.status, "Completed job");
        state.record_terminal(job, self.retention);
        Ok(())
    }

    async fn fail(&self, job_id: &JobId, error: &JobError) -> JobResult<JobStatus> {
        let mut job = {
            let state = self.state.lock();
            state
                .jobs
                .get(job_id)
                .map(|e| e.job.clone())
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?
        };

        let status = apply_failure(&mut job, error);
        if status == JobStatus::Retrying {
            self.retry(&job).await?;
        } else {
            warn!(job_id = %job_id, error = %error, attempts = job.attempt, "Job failed permanently");
            self.state.lock().record_terminal(job, self.retention);
        }
        Ok(status)
    }

    async fn retry(&self, job_data: &JobData) -> JobResult<()> {
        let mut job = job_data.clone();
        job.status = JobStatus::Retrying;
        job.worker_id = None;
        debug!(job_id = %job.id, attempt = job.attempt, retry_at = %job.scheduled_at, "Scheduled job retry");

        let mut state = self.state.lock();
        state.stats_mut(&job.queue).retried += 1;
        state.jobs.insert(
            job.id.clone(),
            Entry {
                job,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobInfo>> {
        let mut state = self.state.lock();
        state.refresh(Instant::now());
        Ok(state.jobs.get(job_id).map(|e| JobInfo::from(e.job.clone())))
    }

    async fn list_active(&self, limit: usize) -> JobResult<Vec<JobInfo>> {
        let mut state = self.state.lock();
        state.refresh(Instant::now());

        let mut jobs: Vec<&JobData> = state
            .jobs
            .values()
            .map(|e| &e.job)
            .filter(|j| !j.status.is_terminal())
            .collect();
        jobs.sort_by_key(|j| (j.status != JobStatus::Running, j.scheduled_at));

        Ok(jobs
            .into_iter()
            .take(limit)
            .cloned()
            .map(JobInfo::from)
            .collect())
    }

    async fn queue_length(&self, queue: &str) -> JobResult<u64> {
        Ok(self.stats(queue).pending)
    }

    async fn cancel(&self, job_id: &JobId) -> JobResult<()> {
        let mut state = self.state.lock();
        let status = state
            .jobs
            .get(job_id)
            .map(|e| e.job.status)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if status == JobStatus::Running || status.is_terminal() {
            return Err(JobError::InvalidState {
                expected: "pending".to_string(),
                actual: status.to_string(),
            });
        }

        if let Some(entry) = state.jobs.remove(job_id) {
            let mut job = entry.job;
            job.set_error(&JobError::Cancelled);
            job.finish(None, false);
            state.record_terminal(job, self.retention);
        }
        Ok(())
    }

    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> JobResult<()> {
        self.state
            .lock()
            .workers
            .insert(worker_id.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn live_workers(&self) -> JobResult<Vec<String>> {
        let mut state = self.state.lock();
        state.refresh(Instant::now());
        let mut workers: Vec<String> = state.workers.keys().cloned().collect();
        workers.sort();
        Ok(workers)
    }

    async fn recover_stale_jobs(&self) -> JobResult<u64> {
        let stale: Vec<JobId> = {
            let mut state = self.state.lock();
            state.refresh(Instant::now());
            let State { jobs, workers, .. } = &*state;
            jobs.values()
                .filter(|e| e.job.status == JobStatus::Running)
                .filter(|e| {
                    e.job
                        .worker_id
                        .as_ref()
                        .map_or(true, |w| !workers.contains_key(w))
                })
                .map(|e| e.job.id.clone())
                .collect()
        };

        let mut recovered = 0;
        for id in stale {
            let status = self
                .fail(&id, &JobError::Worker("worker lost".to_string()))
                .await?;
            warn!(job_id = %id, status = %status, "Recovered stale job from dead worker");
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn health_check(&self) -> JobResult<()> {
        self.ensure_online()
    }
}
