//! Status resolution.
//!
//! Every transport serves the same resolved status document built here, so
//! polling, WebSocket and protocol clients always agree about a job. The
//! pure mapping from a stored record to a client document is separated from
//! the vendor poll so it can be tested directly.

use std::sync::Arc;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use tracing::warn;

use genmedia_models::{JobId, JobOutcome, JobState, JobStatusResponse, OperationStatusResponse};
use genmedia_queue::{JobQueue, JobRecord, QueueError};
use genmedia_storage::{resolve_public_url, GcsClient, StorageConfig, TokenCache};
use genmedia_vendors::{OperationStatus, VertexVideoClient, VertexVideoConfig};

use crate::error::ApiResult;

/// Polls deferred video operations on behalf of the status layer, using the
/// server's own Google Cloud identity.
pub struct OperationPoller {
    client: VertexVideoClient,
    token_cache: Arc<TokenCache>,
    storage: Option<GcsClient>,
    default_model: String,
}

impl OperationPoller {
    /// Build from environment. `None` when the server has no Google Cloud
    /// identity; deferred operations then stay reported as running.
    pub fn from_env() -> Option<Self> {
        let project = std::env::var("GOOGLE_CLOUD_PROJECT").ok()?;
        let region =
            std::env::var("VERTEX_AI_REGION").unwrap_or_else(|_| "us-central1".to_string());

        let sa = match CustomServiceAccount::from_env() {
            Ok(Some(sa)) => sa,
            Ok(None) => {
                warn!("GOOGLE_APPLICATION_CREDENTIALS not set; operation polling disabled");
                return None;
            }
            Err(e) => {
                warn!("Failed to load service account: {}", e);
                return None;
            }
        };

        let provider: Arc<dyn TokenProvider> = Arc::new(sa);
        let storage = match GcsClient::with_token_provider(
            StorageConfig::for_bucket(std::env::var("GCS_BUCKET").unwrap_or_default()),
            Arc::clone(&provider),
        ) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Storage client unavailable, skipping public grants: {}", e);
                None
            }
        };

        Some(Self {
            client: VertexVideoClient::new(VertexVideoConfig::new(project, region)),
            token_cache: Arc::new(TokenCache::new(provider)),
            storage,
            default_model: std::env::var("VIDEO_MODEL")
                .unwrap_or_else(|_| "veo-3.0-generate-preview".to_string()),
        })
    }

    pub async fn poll(&self, operation_name: &str) -> ApiResult<OperationStatus> {
        let token = self.token_cache.get_token().await?;
        let model = operation_model(operation_name).unwrap_or(&self.default_model);
        let status = self.client.poll(&token, model, operation_name).await?;

        // Vendor-written outputs get their best-effort public grant here;
        // worker uploads already received one at upload time.
        if let (OperationStatus::Succeeded { video_uris }, Some(storage)) =
            (&status, &self.storage)
        {
            for uri in video_uris {
                storage.publish_uri(uri).await;
            }
        }

        Ok(status)
    }
}

/// Model segment of a full operation name
/// (`projects/.../publishers/google/models/<model>/operations/<id>`), so a
/// poll always targets the model that produced the operation.
fn operation_model(operation_name: &str) -> Option<&str> {
    let rest = operation_name.split("/models/").nth(1)?;
    let model = rest.split('/').next()?;
    (!model.is_empty()).then_some(model)
}

/// Builds the client-facing status document for a job.
pub struct StatusResolver {
    queue: Arc<JobQueue>,
    poller: Option<OperationPoller>,
}

impl StatusResolver {
    pub fn new(queue: Arc<JobQueue>, poller: Option<OperationPoller>) -> Self {
        Self { queue, poller }
    }

    /// Resolve the current status of `job_id`. Unknown ids yield a
    /// `not_found` document rather than an error.
    pub async fn resolve(&self, job_id: &JobId) -> ApiResult<JobStatusResponse> {
        let handle = self.queue.handle(job_id.clone());
        let record = match handle.record().await {
            Ok(r) => r,
            Err(QueueError::JobNotFound(_)) => {
                return Ok(JobStatusResponse::not_found(job_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        // Deferred video operations get one vendor poll per status request.
        let polled = match deferred_operation(&record) {
            Some(operation_name) => match &self.poller {
                Some(poller) => match poller.poll(operation_name).await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!(job_id = %job_id, "Operation poll failed: {}", e);
                        None
                    }
                },
                None => None,
            },
            None => None,
        };

        Ok(build_status(record, polled))
    }

    /// Probe a vendor operation directly, without going through a job record.
    pub async fn probe_operation(
        &self,
        operation_name: &str,
    ) -> ApiResult<OperationStatusResponse> {
        let poller = self.poller.as_ref().ok_or_else(|| {
            crate::error::ApiError::internal("operation polling is not configured")
        })?;
        let status = poller.poll(operation_name).await?;
        Ok(build_operation_status(operation_name, status))
    }
}

/// Map a vendor operation poll to the client probe document.
pub fn build_operation_status(
    operation_name: &str,
    status: OperationStatus,
) -> OperationStatusResponse {
    match status {
        OperationStatus::Running => OperationStatusResponse {
            operation_name: operation_name.to_string(),
            done: false,
            download_ready: false,
            video_url: None,
            error: None,
        },
        OperationStatus::Succeeded { video_uris } => OperationStatusResponse {
            operation_name: operation_name.to_string(),
            done: true,
            download_ready: !video_uris.is_empty(),
            video_url: video_uris.first().map(|u| resolve_public_url(u)),
            error: None,
        },
        OperationStatus::Failed { message, .. } => OperationStatusResponse {
            operation_name: operation_name.to_string(),
            done: true,
            download_ready: false,
            video_url: None,
            error: Some(message),
        },
    }
}

fn deferred_operation(record: &JobRecord) -> Option<&str> {
    match &record.result {
        Some(JobOutcome::Submitted { operation_name }) if record.state == JobState::Finished => {
            Some(operation_name)
        }
        _ => None,
    }
}

/// Map a stored record (plus an optional fresh operation poll) to the
/// client-facing document.
pub fn build_status(record: JobRecord, polled: Option<OperationStatus>) -> JobStatusResponse {
    let mut resp = JobStatusResponse::from_state(record.job_id, record.state, &record.meta);

    match record.result {
        Some(JobOutcome::Video { video_url }) => {
            resp.video_url = Some(resolve_public_url(&video_url));
            resp.download_url = resp.video_url.clone();
            resp.progress = 100;
            resp.current_step = "Complete".to_string();
        }
        Some(JobOutcome::Audio { artifacts }) => {
            resp.audio_url = Some(resolve_public_url(&artifacts.audio_url));
            resp.display_audio_url = Some(resolve_public_url(&artifacts.display_audio_url));
            resp.download_audio_url = Some(resolve_public_url(&artifacts.download_audio_url));
            resp.download_url = resp.download_audio_url.clone();
            resp.thumbnail_url = artifacts
                .thumbnail_url
                .as_deref()
                .map(resolve_public_url);
            resp.audio_duration_seconds = artifacts.audio_duration_seconds;
            resp.progress = 100;
            resp.current_step = "Complete".to_string();
        }
        Some(JobOutcome::Submitted { operation_name }) => {
            resp.operation_name = Some(operation_name);
            match polled {
                Some(OperationStatus::Succeeded { video_uris }) => {
                    resp.status = JobState::Finished;
                    resp.video_url = video_uris.first().map(|u| resolve_public_url(u));
                    resp.download_url = resp.video_url.clone();
                    resp.progress = 100;
                    resp.current_step = "Complete".to_string();
                }
                Some(OperationStatus::Failed { message, .. }) => {
                    resp.status = JobState::Failed;
                    resp.progress = 0;
                    resp.current_step = "Job failed".to_string();
                    resp.error = Some(message);
                }
                Some(OperationStatus::Running) | None => {
                    // Queue says finished; the client sees it still running.
                    resp.status = JobState::Started;
                    resp.progress = resp.progress.max(60);
                    resp.current_step = "Video generation in progress...".to_string();
                }
            }
        }
        None => {}
    }

    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_models::{AudioArtifacts, JobKind, JobMetadata};

    fn record(state: JobState, result: Option<JobOutcome>) -> JobRecord {
        let mut meta = JobMetadata::queued(3);
        if state == JobState::Started {
            meta.advance(2, 40, "Working");
        }
        JobRecord {
            job_id: JobId::from_string("j-1"),
            kind: JobKind::Video,
            state,
            meta,
            result,
            error: None,
        }
    }

    #[test]
    fn operation_model_extracted_from_operation_name() {
        assert_eq!(
            operation_model(
                "projects/p/locations/us-central1/publishers/google/models/\
                 veo-2.0-generate-001/operations/abc123"
            ),
            Some("veo-2.0-generate-001")
        );
        assert_eq!(operation_model("opaque-handle"), None);
        assert_eq!(operation_model("projects/p/models/"), None);
    }

    #[test]
    fn finished_video_resolves_gs_url() {
        let resp = build_status(
            record(
                JobState::Finished,
                Some(JobOutcome::Video {
                    video_url: "gs://b/videos/j-1/sample_0.mp4".into(),
                }),
            ),
            None,
        );
        assert_eq!(resp.status, JobState::Finished);
        assert_eq!(
            resp.video_url.as_deref(),
            Some("https://storage.googleapis.com/b/videos/j-1/sample_0.mp4")
        );
        assert_eq!(resp.download_url, resp.video_url);
        assert_eq!(resp.progress, 100);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json["download_url"],
            "https://storage.googleapis.com/b/videos/j-1/sample_0.mp4"
        );
    }

    #[test]
    fn submitted_outcome_reports_running_without_poll() {
        let resp = build_status(
            record(
                JobState::Finished,
                Some(JobOutcome::Submitted {
                    operation_name: "op-1".into(),
                }),
            ),
            None,
        );
        assert_eq!(resp.status, JobState::Started);
        assert_eq!(resp.operation_name.as_deref(), Some("op-1"));
        assert!(resp.progress >= 60);
        assert!(!resp.is_terminal());
    }

    #[test]
    fn submitted_outcome_finishes_after_successful_poll() {
        let resp = build_status(
            record(
                JobState::Finished,
                Some(JobOutcome::Submitted {
                    operation_name: "op-1".into(),
                }),
            ),
            Some(OperationStatus::Succeeded {
                video_uris: vec!["gs://b/videos/j-1/sample_0.mp4".into()],
            }),
        );
        assert_eq!(resp.status, JobState::Finished);
        assert!(resp.video_url.is_some());
        assert_eq!(resp.download_url, resp.video_url);
    }

    #[test]
    fn submitted_outcome_fails_after_failed_poll() {
        let resp = build_status(
            record(
                JobState::Finished,
                Some(JobOutcome::Submitted {
                    operation_name: "op-1".into(),
                }),
            ),
            Some(OperationStatus::Failed {
                code: 3,
                message: "policy violation".into(),
            }),
        );
        assert_eq!(resp.status, JobState::Failed);
        assert_eq!(resp.error.as_deref(), Some("policy violation"));
        assert_eq!(resp.progress, 0);
    }

    #[test]
    fn operation_probe_reports_download_ready() {
        let resp = build_operation_status(
            "op-1",
            OperationStatus::Succeeded {
                video_uris: vec!["gs://b/v.mp4".into()],
            },
        );
        assert!(resp.done);
        assert!(resp.download_ready);
        assert_eq!(
            resp.video_url.as_deref(),
            Some("https://storage.googleapis.com/b/v.mp4")
        );

        let resp = build_operation_status("op-1", OperationStatus::Running);
        assert!(!resp.done);
        assert!(!resp.download_ready);
    }

    #[test]
    fn audio_outcome_resolves_all_urls() {
        let resp = build_status(
            record(
                JobState::Finished,
                Some(JobOutcome::Audio {
                    artifacts: AudioArtifacts {
                        audio_url: "gs://b/audio/j/audio.mp3".into(),
                        display_audio_url: "https://storage.googleapis.com/b/audio/j/audio.wav"
                            .into(),
                        download_audio_url: "gs://b/audio/j/audio.wav".into(),
                        thumbnail_url: Some("gs://b/audio/j/thumbnail.png".into()),
                        audio_duration_seconds: Some(42.0),
                    },
                }),
            ),
            None,
        );
        assert!(resp.audio_url.as_deref().unwrap().starts_with("https://"));
        assert!(resp.thumbnail_url.as_deref().unwrap().starts_with("https://"));
        assert_eq!(resp.audio_duration_seconds, Some(42.0));

        // The canonical download points at the downloadable audio file.
        let download = resp.download_url.as_deref().unwrap();
        assert!(download.ends_with(".wav"));
        assert_eq!(resp.download_url, resp.download_audio_url);
    }

    #[test]
    fn unknown_job_has_no_download_url() {
        let resp = JobStatusResponse::not_found(JobId::from_string("missing"));
        assert!(resp.download_url.is_none());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("download_url").is_none());
    }
}
