//! Video generation pipeline.
//!
//! Submits a long-running operation, waits once, and either finishes with a
//! resolved URL or releases the job with the operation handle recorded for
//! later polling.

use tracing::{info, warn};

use genmedia_models::{JobMetadata, JobOutcome};
use genmedia_queue::{JobHandle, QueuedJob};
use genmedia_storage::resolve_public_url;
use genmedia_vendors::OperationStatus;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};

pub async fn generate_video(
    ctx: &ProcessingContext,
    job: &QueuedJob,
    handle: &JobHandle,
) -> WorkerResult<JobOutcome> {
    let params = job.request.parameters.clone().unwrap_or_default();
    let creds = ctx.resolve_credentials(job.request.credentials.as_ref());
    let mut meta = handle.metadata().await?;
    meta.total_steps = job.request.total_steps();

    // Step 1: prepare
    advance(ctx, handle, &mut meta, 1, 10, "Preparing video generation...").await?;
    let token = ctx.gcp_token(&creds).await?;
    let client = ctx.video_client(&creds)?;
    let storage_uri = format!("gs://{}/videos/{}/", creds.bucket()?, job.job_id);

    // Step 2: submit
    advance(ctx, handle, &mut meta, 2, 30, "Submitting generation request...").await?;
    let operation = client
        .submit(&token, &job.request.prompt, &params, &storage_uri)
        .await?;

    meta.operation_name = Some(operation.operation_name.clone());
    handle.set_metadata(&meta).await?;
    info!(job_id = %job.job_id, operation = %operation.operation_name, "Operation submitted");

    // Step 3: one bounded wait, then release
    advance(ctx, handle, &mut meta, 3, 60, "Waiting for video generation...").await?;
    tokio::time::sleep(ctx.config.video_first_poll_delay).await;

    let status = client
        .poll(&token, &params.model, &operation.operation_name)
        .await?;

    match status {
        OperationStatus::Failed { code, message } => {
            warn!(job_id = %job.job_id, code, "Video generation failed");
            Err(WorkerError::video_failed(message))
        }
        OperationStatus::Succeeded { video_uris } => {
            let uri = video_uris
                .first()
                .ok_or_else(|| WorkerError::video_failed("Operation succeeded with no videos"))?;
            let video_url = resolve_public_url(uri);
            info!(job_id = %job.job_id, video_url, "Video ready");
            Ok(JobOutcome::Video { video_url })
        }
        OperationStatus::Running => {
            info!(
                job_id = %job.job_id,
                operation = %operation.operation_name,
                "Operation still running, releasing job"
            );
            Ok(JobOutcome::Submitted {
                operation_name: operation.operation_name,
            })
        }
    }
}

async fn advance(
    ctx: &ProcessingContext,
    handle: &JobHandle,
    meta: &mut JobMetadata,
    step_number: u32,
    progress: u8,
    message: &str,
) -> WorkerResult<()> {
    meta.advance(step_number, progress, message);
    handle.set_metadata(meta).await?;
    ctx.progress
        .publish(&genmedia_models::JobEvent::progress_step(
            handle.job_id().clone(),
            progress,
            message,
            step_number,
            meta.total_steps,
        ))
        .await?;
    Ok(())
}
