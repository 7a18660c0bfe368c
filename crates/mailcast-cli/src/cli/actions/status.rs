use super::{connect_queue, load_config};
use anyhow::{Context, Result};
use mailcast_dispatch::{BulkDispatchResult, BulkStatus, StatusService};
use mailcast_jobs::{JobId, JobInfo, JobState, JobStatusReport};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Query {
    Job(JobId),
    Bulk(JobId),
    Active { max: usize },
}

#[derive(Debug)]
pub struct Args {
    pub config_dir: PathBuf,
    pub query: Query,
    pub json: bool,
}

/// Prints the requested status report.
/// # Errors
/// Returns an error if the job backend cannot be queried.
pub async fn execute(args: Args) -> Result<()> {
    let (_, config) = load_config(&args.config_dir).await?;
    let service = StatusService::new(connect_queue(&config).await?);

    let output = match &args.query {
        Query::Job(id) => {
            let report = service.query_job(id).await.context("status query failed")?;
            if args.json {
                serde_json::to_string_pretty(&report)?
            } else {
                render_job(&report)
            }
        }
        Query::Bulk(id) => {
            let status = service.query_bulk(id).await.context("status query failed")?;
            if args.json {
                serde_json::to_string_pretty(&status)?
            } else {
                render_bulk(&status)
            }
        }
        Query::Active { max } => {
            let jobs = service
                .list_active(*max)
                .await
                .context("failed to list active jobs")?;
            let workers = service
                .live_workers()
                .await
                .context("failed to list workers")?;
            if args.json {
                serde_json::to_string_pretty(&serde_json::json!({
                    "workers": workers,
                    "jobs": jobs,
                }))?
            } else {
                render_active(&workers, &jobs)
            }
        }
    };

    println!("{output}");
    Ok(())
}

fn describe(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "waiting to be processed",
        JobState::Running => "running",
        JobState::Retrying => "waiting for another attempt",
        JobState::Succeeded => "finished successfully",
        JobState::Failed => "failed",
        JobState::Unknown => "unknown handle, or its result has expired",
    }
}

fn render_job(report: &JobStatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job {}", report.job_id);
    let _ = writeln!(out, "State: {} ({})", report.state, describe(report.state));
    if report.state != JobState::Unknown {
        let _ = writeln!(out, "Attempt: {}/{}", report.attempt, report.max_attempts);
    }
    if let Some(error) = &report.last_error {
        let _ = writeln!(out, "Last error: {error}");
    }
    if let Some(result) = &report.result {
        let _ = writeln!(out, "Result: {result}");
    }
    out.trim_end().to_string()
}

fn render_bulk(status: &BulkStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bulk dispatch {}", status.report.job_id);
    let _ = writeln!(
        out,
        "State: {} ({})",
        status.report.state,
        describe(status.report.state)
    );

    match &status.outcome {
        Some(BulkDispatchResult::Scheduled {
            total_emails,
            skipped_rows,
            ..
        }) => {
            let _ = writeln!(out, "Scheduled: {total_emails} emails");
            if *skipped_rows > 0 {
                let _ = writeln!(out, "Skipped rows: {skipped_rows}");
            }
        }
        Some(BulkDispatchResult::Failed { error }) => {
            let _ = writeln!(out, "Nothing scheduled: {error}");
        }
        None => {}
    }

    if !status.children.is_empty() {
        let counts = &status.counts;
        let _ = writeln!(
            out,
            "Succeeded: {}  Failed: {}  Pending: {}  Unknown: {}",
            counts.succeeded, counts.failed, counts.pending, counts.unknown
        );
        for (i, child) in status.children.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>4}. {:<9} {} <{}> +{}s",
                i + 1,
                child.report.state.to_string(),
                child.child.name,
                child.child.recipient,
                child.child.scheduled_delay_secs
            );
        }
    }
    out.trim_end().to_string()
}

fn render_active(workers: &[String], jobs: &[JobInfo]) -> String {
    let mut out = String::new();
    if workers.is_empty() {
        let _ = writeln!(out, "No live worker.");
    } else {
        let _ = writeln!(out, "Live workers: {}", workers.join(", "));
    }

    if jobs.is_empty() {
        let _ = writeln!(out, "No active job.");
    } else {
        let _ = writeln!(out, "Active jobs: {}", jobs.len());
        for job in jobs {
            let _ = writeln!(
                out,
                "  {} {:<13} {:<9} attempt {}/{}  eligible {}",
                job.id,
                job.name,
                job.status.to_string(),
                job.attempt,
                job.max_attempts,
                job.scheduled_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcast_dispatch::{ChildJob, ChildStatus};
    use mailcast_jobs::StateCounts;

    fn report(id: &str, state: JobState) -> JobStatusReport {
        JobStatusReport {
            job_id: JobId::from(id),
            state,
            result: None,
            attempt: 1,
            max_attempts: 3,
            last_error: None,
        }
    }

    #[test]
    fn test_unknown_job_has_no_attempts() {
        let text = render_job(&report("gone", JobState::Unknown));
        assert!(text.contains("unknown handle"));
        assert!(!text.contains("Attempt"));
    }

    #[test]
    fn test_retrying_job_shows_last_error() {
        let text = render_job(&JobStatusReport {
            last_error: Some("421 Try again later".into()),
            ..report("abc", JobState::Retrying)
        });
        assert!(text.contains("State: retrying"));
        assert!(text.contains("Attempt: 1/3"));
        assert!(text.contains("Last error: 421 Try again later"));
    }

    #[test]
    fn test_bulk_lists_children_with_counts() {
        let child = |id: &str, state| ChildStatus {
            child: ChildJob {
                job_id: JobId::from(id),
                recipient: format!("{id}@example.org"),
                name: id.to_uppercase(),
                scheduled_delay_secs: 5,
                simulate: false,
            },
            report: report(id, state),
        };
        let children = vec![child("awa", JobState::Succeeded), child("fatou", JobState::Failed)];
        let counts = StateCounts::tally(children.iter().map(|c| &c.report));

        let text = render_bulk(&BulkStatus {
            report: report("bulk", JobState::Succeeded),
            outcome: Some(BulkDispatchResult::Scheduled {
                total_emails: 2,
                tasks: children.iter().map(|c| c.child.clone()).collect(),
                skipped_rows: 1,
                message: String::new(),
            }),
            children,
            counts,
        });

        assert!(text.contains("Scheduled: 2 emails"));
        assert!(text.contains("Skipped rows: 1"));
        assert!(text.contains("Succeeded: 1  Failed: 1  Pending: 0  Unknown: 0"));
        assert!(text.contains("FATOU <fatou@example.org> +5s"));
    }

    #[test]
    fn test_empty_active_listing() {
        let text = render_active(&[], &[]);
        assert!(text.contains("No live worker."));
        assert!(text.contains("No active job."));
    }
}
