//! Redis integration tests.
//!
//! These require a running Redis. Run with:
//!   cargo test -p genmedia-queue --test redis -- --ignored

use futures_util::StreamExt;

use genmedia_models::{CreateJobRequest, JobId, JobKind, JobState};
use genmedia_queue::{JobQueue, ProgressChannel, QueuedJob};

fn test_request() -> CreateJobRequest {
    CreateJobRequest {
        mode: JobKind::Audio,
        prompt: "sixty seconds on bioluminescence".into(),
        parameters: None,
        audio: None,
        credentials: None,
    }
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job submit and consume cycle, including the immediately visible
/// queued record.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_submit_consume() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job_id = JobId::new();
    let job = QueuedJob::new(job_id.clone(), test_request());

    let handle = queue.submit(&job).await.expect("Failed to submit");

    // The record must be visible before any worker touches the job.
    let state = handle.state().await.expect("Failed to read state");
    assert_eq!(state, JobState::Queued);

    // Submission also lands at the head of the recency index.
    let recent = queue
        .recent_job_ids(10)
        .await
        .expect("Failed to list recent jobs");
    assert_eq!(recent.first(), Some(&job_id));

    let jobs = queue
        .consume("test-consumer", 1000, 1)
        .await
        .expect("Failed to consume");
    assert_eq!(jobs.len(), 1);
    let (message_id, consumed) = &jobs[0];
    assert_eq!(consumed.job_id, job_id);

    queue.ack(message_id).await.expect("Failed to ack");
    println!("Job {} acknowledged", job_id);
}

/// Test progress channel pub/sub delivery.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_progress_pubsub() {
    dotenvy::dotenv().ok();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let channel = ProgressChannel::new(&redis_url).expect("Failed to create channel");

    let job_id = JobId::new();
    let mut events = channel
        .subscribe(&job_id)
        .await
        .expect("Failed to subscribe");

    channel
        .progress(&job_id, 42, "Halfway there")
        .await
        .expect("Failed to publish");

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.next())
        .await
        .expect("Timed out waiting for event")
        .expect("Stream ended");
    assert_eq!(event.job_id(), &job_id);
    assert!(!event.is_terminal());
}
