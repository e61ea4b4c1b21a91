//! Audio generation pipeline.
//!
//! Script -> voice -> synthesis -> (optional) thumbnail -> upload. Only the
//! synthesis chain is fatal; transcoding and thumbnails degrade gracefully.

use tracing::{info, warn};

use genmedia_models::{AudioArtifacts, AudioOptions, JobMetadata, JobOutcome};
use genmedia_queue::{JobHandle, QueuedJob};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::script::{enforce_duration_budget, sanitize_script_text};
use crate::transcode;

pub async fn generate_audio(
    ctx: &ProcessingContext,
    job: &QueuedJob,
    handle: &JobHandle,
) -> WorkerResult<JobOutcome> {
    let result = run_pipeline(ctx, job, handle).await;
    // Scratch files go away on every exit path, success or failure.
    transcode::cleanup_work_dir(&ctx.config.work_dir, job.job_id.as_str()).await;
    result
}

async fn run_pipeline(
    ctx: &ProcessingContext,
    job: &QueuedJob,
    handle: &JobHandle,
) -> WorkerResult<JobOutcome> {
    let options = job.request.audio.clone().unwrap_or_default();
    let creds = ctx.resolve_credentials(job.request.credentials.as_ref());
    let total_steps = job.request.total_steps();
    let mut meta = handle.metadata().await?;
    meta.total_steps = total_steps;

    // Step 1: script
    advance(ctx, handle, &mut meta, 1, 10, "Generating script...").await?;
    let script_client = ctx.script_client(&creds);
    let raw_script = script_client
        .generate(
            options.script_provider,
            &job.request.prompt,
            options.target_duration_seconds,
        )
        .await
        .map_err(|e| WorkerError::script_failed(e.to_string()))?;

    let mut script = sanitize_script_text(&raw_script);
    if let Some(requested) = options.target_duration_seconds {
        script = enforce_duration_budget(
            &script,
            requested,
            ctx.config.words_per_minute,
            ctx.config.duration_violation_multiplier,
            ctx.config.duration_slack_secs,
        );
    }
    if script.is_empty() {
        return Err(WorkerError::script_failed("Generated script was empty"));
    }
    info!(job_id = %job.job_id, words = script.split_whitespace().count(), "Script ready");

    // Step 2: voice
    advance(ctx, handle, &mut meta, 2, 30, "Selecting voice...").await?;
    let speech = ctx.speech_client(&creds)?;
    let voice_id = speech.select_voice().await;

    // Step 3: synthesis
    advance(ctx, handle, &mut meta, 3, 50, "Synthesizing speech...").await?;
    let mp3_bytes = speech
        .synthesize(&voice_id, &script)
        .await
        .map_err(|e| WorkerError::synthesis_failed(e.to_string()))?;

    let job_id = job.job_id.as_str();
    let mp3_path =
        transcode::write_work_file(&ctx.config.work_dir, job_id, "audio.mp3", &mp3_bytes).await?;
    let duration = transcode::probe_duration_seconds(&mp3_path).await;

    let delivery = match transcode::transcode_audio(&mp3_path, options.output_format).await {
        Some(path) => path,
        None => {
            warn!(job_id, "Transcode unavailable, delivering canonical MP3");
            mp3_path.clone()
        }
    };

    // Step 4 (optional): thumbnail
    let mut step = 3;
    let thumbnail_bytes = if options.generate_thumbnail {
        step += 1;
        advance(ctx, handle, &mut meta, step, 70, "Generating thumbnail...").await?;
        match generate_thumbnail(ctx, &creds, &job.request.prompt, &options).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                // A missing thumbnail never fails the job
                warn!(job_id, "Thumbnail generation failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    // Final step: upload
    step += 1;
    advance(ctx, handle, &mut meta, step, 90, "Uploading artifacts...").await?;
    let storage = ctx.storage_client(&creds)?;

    let audio_url = storage
        .upload_bytes(
            &format!("audio/{}/audio.mp3", job_id),
            mp3_bytes,
            "audio/mpeg",
        )
        .await?;

    let (display_audio_url, download_audio_url) = if delivery != mp3_path {
        let bytes = tokio::fs::read(&delivery).await?;
        let key = format!(
            "audio/{}/audio.{}",
            job_id,
            options.output_format.extension()
        );
        let url = storage
            .upload_bytes(&key, bytes, options.output_format.content_type())
            .await?;
        (url.clone(), url)
    } else {
        (audio_url.clone(), audio_url.clone())
    };

    let thumbnail_url = match thumbnail_bytes {
        Some(bytes) => {
            let key = format!("audio/{}/thumbnail.png", job_id);
            match storage.upload_bytes(&key, bytes, "image/png").await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(job_id, "Thumbnail upload failed: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    Ok(JobOutcome::Audio {
        artifacts: AudioArtifacts {
            audio_url,
            display_audio_url,
            download_audio_url,
            thumbnail_url,
            audio_duration_seconds: duration,
        },
    })
}

async fn generate_thumbnail(
    ctx: &ProcessingContext,
    creds: &crate::context::JobCredentials,
    prompt: &str,
    options: &AudioOptions,
) -> WorkerResult<Vec<u8>> {
    let thumbnail_prompt = options
        .thumbnail_prompt
        .clone()
        .unwrap_or_else(|| format!("Square podcast cover art for: {}", prompt));

    let token = ctx.gcp_token(creds).await?;
    let image = ctx.image_client(creds)?;
    Ok(image.generate(&token, &thumbnail_prompt).await?)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::tempdir;

    use genmedia_models::{CreateJobRequest, JobId, JobKind};
    use genmedia_queue::{JobQueue, ProgressChannel, QueueConfig};

    use crate::config::WorkerConfig;

    #[tokio::test]
    async fn failed_pipeline_still_cleans_work_dir() {
        let scratch = tempdir().unwrap();
        let work_dir = scratch.path().to_str().unwrap().to_string();

        let job_id = JobId::from_string("job-cleanup");
        transcode::write_work_file(&work_dir, job_id.as_str(), "audio.mp3", b"partial")
            .await
            .unwrap();

        // An unroutable Redis makes the first metadata read fail.
        let queue = JobQueue::new(QueueConfig {
            redis_url: "redis://127.0.0.1:1".into(),
            ..QueueConfig::default()
        })
        .unwrap();
        let progress = ProgressChannel::new("redis://127.0.0.1:1").unwrap();
        let ctx = ProcessingContext::new(
            WorkerConfig {
                work_dir: work_dir.clone(),
                ..WorkerConfig::default()
            },
            progress,
        );

        let job = QueuedJob::new(
            job_id.clone(),
            CreateJobRequest {
                mode: JobKind::Audio,
                prompt: "rain".into(),
                parameters: None,
                audio: None,
                credentials: None,
            },
        );
        let handle = queue.handle(job_id.clone());

        let result = generate_audio(&ctx, &job, &handle).await;
        assert!(result.is_err());
        assert!(!Path::new(&work_dir).join(job_id.as_str()).exists());
    }
}
