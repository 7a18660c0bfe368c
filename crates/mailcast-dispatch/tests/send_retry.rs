//! Send job retries through a real worker pool and a mocked transport.

mod common;

use common::{dispatch_config, pool_config, smtp_error, MockTransport, SUBJECT};
use mailcast_dispatch::{SendEmailHandler, SendEmailJob, SendOutcome};
use mailcast_jobs::{
    InMemoryJobQueue, JobId, JobQueue, JobStatus, QueuedJob, RetryPolicy, WorkerExit, WorkerPool,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn immediate_retries(job: SendEmailJob) -> QueuedJob<SendEmailJob> {
    QueuedJob::new(job).with_retry(RetryPolicy::fixed(3, Duration::ZERO))
}

async fn run_pool(
    queue: &Arc<InMemoryJobQueue>,
    transport: MockTransport,
    dir: &std::path::Path,
    max_jobs: u64,
) -> WorkerPool<InMemoryJobQueue> {
    let pool = WorkerPool::new(Arc::clone(queue), pool_config(max_jobs));
    pool.register::<SendEmailJob, _>(SendEmailHandler::new(
        Arc::new(transport),
        &dispatch_config(dir),
    ));
    assert_eq!(pool.run().await.unwrap(), WorkerExit::Recycle);
    pool
}

async fn outcome(queue: &InMemoryJobQueue, id: &JobId) -> (JobStatus, u32, SendOutcome) {
    let info = queue.get_job(id).await.unwrap().expect("job record present");
    let outcome = serde_json::from_value(info.result.expect("terminal result")).unwrap();
    (info.status, info.attempt, outcome)
}

#[tokio::test]
async fn simulated_send_succeeds_without_transport_calls() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(InMemoryJobQueue::new());

    let mut transport = MockTransport::new();
    transport.expect_send_one().times(0);

    let id = queue
        .enqueue(SendEmailJob {
            simulate: true,
            ..SendEmailJob::new("definitely not an address", "Nobody")
        })
        .await
        .unwrap();

    run_pool(&queue, transport, dir.path(), 1).await;

    let (status, attempt, outcome) = outcome(&queue, &id).await;
    assert_eq!(status, JobStatus::Succeeded);
    assert_eq!(attempt, 1);
    assert_eq!(
        outcome,
        SendOutcome::Simulated {
            recipient: "definitely not an address".into(),
            name: "Nobody".into(),
        }
    );
}

#[tokio::test]
async fn successful_send_uses_template_subject() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(InMemoryJobQueue::new());

    let mut transport = MockTransport::new();
    transport
        .expect_send_one()
        .withf(|to, subject, html| {
            to == "awa@example.org" && subject == SUBJECT && html.contains("class=\"header\"")
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let id = queue
        .enqueue(SendEmailJob::new("awa@example.org", "Awa"))
        .await
        .unwrap();

    run_pool(&queue, transport, dir.path(), 1).await;

    let (status, attempt, outcome) = outcome(&queue, &id).await;
    assert_eq!(status, JobStatus::Succeeded);
    assert_eq!(attempt, 1);
    assert!(matches!(outcome, SendOutcome::Succeeded { .. }));
}

#[tokio::test]
async fn always_failing_transport_fails_after_three_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(InMemoryJobQueue::new());

    let mut transport = MockTransport::new();
    transport
        .expect_send_one()
        .times(3)
        .returning(|to, _, _| Err(smtp_error(to)));

    let id = queue
        .enqueue_with(immediate_retries(SendEmailJob::new("moussa@example.org", "Moussa")))
        .await
        .unwrap();

    run_pool(&queue, transport, dir.path(), 3).await;

    let (status, attempt, outcome) = outcome(&queue, &id).await;
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(attempt, 3);
    match outcome {
        SendOutcome::Failed {
            recipient, error, ..
        } => {
            assert_eq!(recipient, "moussa@example.org");
            assert!(error.contains("421"));
        }
        other => panic!("expected a failed outcome, got {other:?}"),
    }

    // Nothing left to retry.
    let leftover = queue
        .dequeue(&["email_queue".to_string()], "probe")
        .await
        .unwrap();
    assert!(leftover.is_none());
}

#[tokio::test]
async fn transport_recovering_on_third_attempt_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(InMemoryJobQueue::new());

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let mut transport = MockTransport::new();
    transport
        .expect_send_one()
        .times(3)
        .returning(move |to, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(smtp_error(to))
            } else {
                Ok(())
            }
        });

    let id = queue
        .enqueue_with(immediate_retries(SendEmailJob::new("fatou@example.org", "Fatou")))
        .await
        .unwrap();

    let pool = run_pool(&queue, transport, dir.path(), 3).await;

    let (status, attempt, outcome) = outcome(&queue, &id).await;
    assert_eq!(status, JobStatus::Succeeded);
    assert_eq!(attempt, 3);
    assert!(matches!(outcome, SendOutcome::Succeeded { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(pool.stats().jobs_failed, 2);
}

#[tokio::test]
async fn failed_attempt_waits_for_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(InMemoryJobQueue::new());

    let mut transport = MockTransport::new();
    transport
        .expect_send_one()
        .times(1)
        .returning(|to, _, _| Err(smtp_error(to)));

    // Default policy: 60 s between attempts.
    let id = queue
        .enqueue(SendEmailJob::new("awa@example.org", "Awa"))
        .await
        .unwrap();

    run_pool(&queue, transport, dir.path(), 1).await;

    let info = queue.get_job(&id).await.unwrap().unwrap();
    assert_eq!(info.status, JobStatus::Retrying);
    assert_eq!(info.attempt, 1);
    assert!(info.result.is_none());
    assert!((info.scheduled_at - info.created_at).num_seconds() >= 59);
}
