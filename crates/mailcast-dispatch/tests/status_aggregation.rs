//! Bulk status aggregation over child send jobs.

mod common;

use mailcast_dispatch::{
    BulkDispatchHandler, BulkDispatchJob, BulkDispatchResult, DispatchError, SendEmailJob,
    SendOutcome, StatusService,
};
use mailcast_jobs::{InMemoryJobQueue, JobId, JobQueue, JobState, StateCounts};
use std::sync::Arc;

const WORKER: &str = "test-worker";

/// Runs a bulk job by hand and records its result, as a worker would.
async fn run_bulk(queue: &Arc<InMemoryJobQueue>, dir: &std::path::Path) -> JobId {
    let bulk_id = queue.enqueue(BulkDispatchJob::default()).await.unwrap();

    let data = queue
        .dequeue(&["bulk_email_queue".to_string()], WORKER)
        .await
        .unwrap()
        .expect("bulk job eligible");
    let job: BulkDispatchJob = data.deserialize().unwrap();

    let result = BulkDispatchHandler::new(Arc::clone(queue), dir.join("recipients.csv"))
        .schedule(&job)
        .await;
    assert!(matches!(result, BulkDispatchResult::Scheduled { .. }));

    queue
        .complete(&bulk_id, serde_json::to_value(&result).unwrap(), true)
        .await
        .unwrap();
    bulk_id
}

async fn finish_next_send(queue: &InMemoryJobQueue, succeed: bool) {
    let data = queue
        .dequeue(&["email_queue".to_string()], WORKER)
        .await
        .unwrap()
        .expect("send job eligible");
    let job: SendEmailJob = data.deserialize().unwrap();

    let outcome = if succeed {
        SendOutcome::Succeeded {
            recipient: job.recipient_email,
            name: job.recipient_name,
        }
    } else {
        SendOutcome::Failed {
            recipient: job.recipient_email,
            name: job.recipient_name,
            error: "550 mailbox unavailable".into(),
        }
    };
    queue
        .complete(&data.id, serde_json::to_value(&outcome).unwrap(), succeed)
        .await
        .unwrap();
}

#[tokio::test]
async fn bulk_status_tallies_child_states() {
    let dir = tempfile::tempdir().unwrap();
    common::write_members(dir.path(), 5);
    let queue = Arc::new(InMemoryJobQueue::new());

    let bulk_id = run_bulk(&queue, dir.path()).await;
    finish_next_send(&queue, true).await;
    finish_next_send(&queue, true).await;
    finish_next_send(&queue, false).await;

    let status = StatusService::new(Arc::clone(&queue))
        .query_bulk(&bulk_id)
        .await
        .unwrap();

    assert_eq!(status.report.state, JobState::Succeeded);
    assert_eq!(status.children.len(), 5);
    assert_eq!(
        status.counts,
        StateCounts {
            succeeded: 2,
            failed: 1,
            pending: 2,
            unknown: 0,
        }
    );
    assert_eq!(status.counts.total(), 5);

    let failed: Vec<_> = status
        .children
        .iter()
        .filter(|c| c.report.state == JobState::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    let outcome: SendOutcome =
        serde_json::from_value(failed[0].report.result.clone().unwrap()).unwrap();
    assert_eq!(outcome.recipient(), failed[0].child.recipient);
}

#[tokio::test]
async fn bulk_not_yet_run_reports_no_children() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let bulk_id = queue.enqueue(BulkDispatchJob::default()).await.unwrap();

    let status = StatusService::new(Arc::clone(&queue))
        .query_bulk(&bulk_id)
        .await
        .unwrap();

    assert_eq!(status.report.state, JobState::Pending);
    assert!(status.outcome.is_none());
    assert!(status.children.is_empty());
    assert_eq!(status.counts.total(), 0);
}

#[tokio::test]
async fn unknown_handle_reports_unknown() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let service = StatusService::new(Arc::clone(&queue));
    let id = JobId::from("no-such-job");

    let report = service.query_job(&id).await.unwrap();
    assert_eq!(report.state, JobState::Unknown);
    assert!(report.result.is_none());

    let status = service.query_bulk(&id).await.unwrap();
    assert_eq!(status.report.state, JobState::Unknown);
    assert!(status.children.is_empty());
}

#[tokio::test]
async fn send_handle_is_not_a_bulk_job() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let id = queue
        .enqueue(SendEmailJob::new("awa@example.org", "Awa"))
        .await
        .unwrap();
    finish_next_send(&queue, true).await;

    let err = StatusService::new(Arc::clone(&queue))
        .query_bulk(&id)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotABulkJob(_)));
}
