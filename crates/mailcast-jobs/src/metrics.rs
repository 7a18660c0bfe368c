//! Metrics for job queue monitoring.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding binary installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue system.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "mailcast_jobs_enqueued_total";
    /// Total jobs dequeued for processing.
    pub const JOBS_DEQUEUED_TOTAL: &str = "mailcast_jobs_dequeued_total";
    /// Total jobs that terminated successfully.
    pub const JOBS_SUCCEEDED_TOTAL: &str = "mailcast_jobs_succeeded_total";
    /// Total jobs that terminated unsuccessfully.
    pub const JOBS_FAILED_TOTAL: &str = "mailcast_jobs_failed_total";
    /// Total attempts rescheduled for retry.
    pub const JOBS_RETRIED_TOTAL: &str = "mailcast_jobs_retried_total";
    /// Total attempts that hit the execution timeout.
    pub const JOBS_TIMED_OUT_TOTAL: &str = "mailcast_jobs_timed_out_total";

    /// Job execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "mailcast_job_duration_seconds";
    /// Time between eligibility and start, in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "mailcast_job_wait_time_seconds";

    /// Jobs currently executing in a pool.
    pub const WORKERS_IN_FLIGHT: &str = "mailcast_workers_in_flight";
    /// Worker pool concurrency.
    pub const WORKERS_CONCURRENCY: &str = "mailcast_workers_concurrency";
    /// Pools that exited to be recycled.
    pub const WORKERS_RECYCLED_TOTAL: &str = "mailcast_workers_recycled_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_DEQUEUED_TOTAL,
        "Total number of jobs dequeued for processing"
    );
    describe_counter!(
        names::JOBS_SUCCEEDED_TOTAL,
        "Total number of jobs that terminated successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of failed job attempts"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(
        names::JOBS_TIMED_OUT_TOTAL,
        "Total number of job attempts that timed out"
    );

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job execution duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Job wait time (time in queue) in seconds"
    );

    describe_gauge!(
        names::WORKERS_IN_FLIGHT,
        "Number of jobs currently executing"
    );
    describe_gauge!(
        names::WORKERS_CONCURRENCY,
        "Worker pool concurrency setting"
    );
    describe_counter!(
        names::WORKERS_RECYCLED_TOTAL,
        "Total number of worker pools recycled"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record jobs enqueued.
    pub fn jobs_enqueued(queue: &str, job_name: &str, count: u64) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .increment(count);
    }

    /// Record a job dequeued.
    pub fn job_dequeued(queue: &str, job_name: &str) {
        counter!(
            names::JOBS_DEQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .increment(1);
    }

    /// Record a job that terminated successfully.
    pub fn job_succeeded(queue: &str, job_name: &str, duration: Duration) {
        counter!(
            names::JOBS_SUCCEEDED_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string(),
            "status" => "succeeded"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed attempt.
    pub fn job_failed(queue: &str, job_name: &str, error_type: &str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job retried.
    pub fn job_retried(queue: &str, job_name: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record a job timeout.
    pub fn job_timed_out(queue: &str, job_name: &str) {
        counter!(
            names::JOBS_TIMED_OUT_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .increment(1);
    }

    /// Record job wait time.
    pub fn job_wait_time(queue: &str, job_name: &str, wait_time: Duration) {
        histogram!(
            names::JOB_WAIT_TIME_SECONDS,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .record(wait_time.as_secs_f64());
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update in-flight gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_in_flight(worker_id: &str, in_flight: usize, concurrency: usize) {
        gauge!(
            names::WORKERS_IN_FLIGHT,
            "worker_id" => worker_id.to_string()
        )
        .set(in_flight as f64);

        gauge!(
            names::WORKERS_CONCURRENCY,
            "worker_id" => worker_id.to_string()
        )
        .set(concurrency as f64);
    }

    /// Record a pool exiting for recycle.
    pub fn recycled() {
        counter!(names::WORKERS_RECYCLED_TOTAL).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        register_metrics();
    }

    #[test]
    fn test_job_metrics() {
        JobMetrics::jobs_enqueued("email_queue", "send_email", 3);
        JobMetrics::job_dequeued("email_queue", "send_email");
        JobMetrics::job_succeeded("email_queue", "send_email", Duration::from_secs(1));
        JobMetrics::job_failed("email_queue", "send_email", "timeout", Duration::from_secs(5));
        WorkerMetrics::update_in_flight("w1", 1, 2);
    }
}
