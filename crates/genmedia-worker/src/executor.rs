//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info};
use uuid::Uuid;

use genmedia_models::{JobEvent, JobKind, JobOutcome};
use genmedia_queue::{JobHandle, JobQueue, QueuedJob};

use crate::audio_pipeline::generate_audio;
use crate::config::WorkerConfig;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::video_pipeline::generate_video;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self, ctx: Arc<ProcessingContext>) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self, ctx: &Arc<ProcessingContext>) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single job. There are no retries: every exit path records a
    /// terminal state, publishes the matching event and acks the message.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueuedJob,
    ) {
        let job_id = job.job_id.clone();
        info!(job_id = %job_id, kind = %job.kind(), "Executing job");

        let handle = queue.handle(job_id.clone());
        if let Err(e) = handle.mark_started().await {
            error!(job_id = %job_id, "Failed to mark job started: {}", e);
        }

        let result = Self::process_job(&ctx, &job, &handle).await;

        match result {
            Ok(outcome) => {
                if let Err(e) = Self::finalize_success(&ctx, &handle, &outcome).await {
                    error!(job_id = %job_id, "Failed to finalize job: {}", e);
                } else {
                    info!(job_id = %job_id, "Job completed");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, "Job failed: {}", e);
                Self::finalize_failure(&ctx, &handle, &e.to_string()).await;
            }
        }

        if let Err(e) = queue.ack(&message_id).await {
            error!(job_id = %job_id, "Failed to ack job: {}", e);
        }
    }

    async fn finalize_success(
        ctx: &ProcessingContext,
        handle: &JobHandle,
        outcome: &JobOutcome,
    ) -> WorkerResult<()> {
        let mut meta = handle.metadata().await?;
        meta.scrub_credentials();

        match outcome {
            JobOutcome::Submitted { operation_name } => {
                // Queue-terminal but not client-terminal; the status layer
                // keeps reporting this job as running until the operation
                // resolves.
                meta.operation_name = Some(operation_name.clone());
                handle.finish(outcome, &meta).await?;
                ctx.progress
                    .progress(
                        handle.job_id(),
                        meta.progress.max(60),
                        "Video generation in progress...",
                    )
                    .await?;
            }
            _ => {
                meta.advance(meta.total_steps, 100, "Complete");
                handle.finish(outcome, &meta).await?;
                let result = serde_json::to_value(outcome)?;
                ctx.progress.complete(handle.job_id(), result).await?;
            }
        }
        Ok(())
    }

    async fn finalize_failure(ctx: &ProcessingContext, handle: &JobHandle, error: &str) {
        let mut meta = match handle.metadata().await {
            Ok(m) => m,
            Err(e) => {
                error!(job_id = %handle.job_id(), "Failed to load metadata: {}", e);
                Default::default()
            }
        };
        meta.scrub_credentials();
        meta.error = Some(error.to_string());

        if let Err(e) = handle.fail(error, &meta).await {
            error!(job_id = %handle.job_id(), "Failed to record failure: {}", e);
        }
        if let Err(e) = ctx
            .progress
            .publish(&JobEvent::error(handle.job_id().clone(), error))
            .await
        {
            error!(job_id = %handle.job_id(), "Failed to publish error event: {}", e);
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn process_job(
        ctx: &ProcessingContext,
        job: &QueuedJob,
        handle: &JobHandle,
    ) -> WorkerResult<JobOutcome> {
        match job.kind() {
            JobKind::Video => generate_video(ctx, job, handle).await,
            JobKind::Audio => generate_audio(ctx, job, handle).await,
        }
    }
}
