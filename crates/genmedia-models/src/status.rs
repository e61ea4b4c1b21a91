//! Client-facing response shapes.
//!
//! `JobStatusResponse` is the single status document every transport
//! (polling, long-poll, WebSocket, protocol façade) serves, so all of them
//! agree about a job by construction.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobKind, JobMetadata, JobState};

/// Response to a job submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub mode: JobKind,
    pub progress: u8,
    pub step_number: u32,
    pub total_steps: u32,
    pub message: String,
}

impl CreateJobResponse {
    pub fn queued(job_id: JobId, mode: JobKind, total_steps: u32) -> Self {
        Self {
            job_id,
            status: JobState::Queued,
            mode,
            progress: 0,
            step_number: 0,
            total_steps,
            message: format!("{} generation job queued", mode),
        }
    }
}

/// Full resolved status of a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub progress: u8,
    pub current_step: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,

    /// Canonical fetchable artifact for a completed job: the video URL for
    /// video jobs, the downloadable audio URL for audio jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration_seconds: Option<f64>,

    /// Vendor operation handle when the job is awaiting a long-running
    /// operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusResponse {
    /// Answer for a job id the queue has never seen.
    pub fn not_found(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobState::NotFound,
            progress: 0,
            current_step: "Job not found".to_string(),
            step_number: None,
            total_steps: None,
            download_url: None,
            video_url: None,
            audio_url: None,
            display_audio_url: None,
            download_audio_url: None,
            thumbnail_url: None,
            audio_duration_seconds: None,
            operation_name: None,
            error: None,
        }
    }

    /// Base status from queue state and metadata, before artifact URLs are
    /// filled in.
    pub fn from_state(job_id: JobId, state: JobState, meta: &JobMetadata) -> Self {
        let mut resp = Self {
            job_id,
            status: state,
            progress: meta.progress,
            current_step: meta.current_step.clone(),
            step_number: (meta.step_number > 0).then_some(meta.step_number),
            total_steps: (meta.total_steps > 0).then_some(meta.total_steps),
            download_url: None,
            video_url: None,
            audio_url: None,
            display_audio_url: None,
            download_audio_url: None,
            thumbnail_url: None,
            audio_duration_seconds: None,
            operation_name: meta.operation_name.clone(),
            error: meta.error.clone(),
        };
        resp.apply_state_defaults();
        resp
    }

    /// Fill in default progress and step text where the metadata has none,
    /// so clients always see a meaningful line for fresh or failed jobs.
    pub fn apply_state_defaults(&mut self) {
        match self.status {
            JobState::Queued => {
                self.progress = 0;
                if self.current_step.is_empty() {
                    self.current_step = "Job queued, waiting to start".to_string();
                }
            }
            JobState::Started => {
                if self.progress == 0 {
                    self.progress = 5;
                    if self.current_step.is_empty() {
                        self.current_step = "Job started, initializing...".to_string();
                    }
                }
            }
            JobState::Failed => {
                self.progress = 0;
                if self.current_step.is_empty() {
                    self.current_step = "Job failed".to_string();
                }
            }
            JobState::Finished | JobState::NotFound => {}
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || self.status == JobState::NotFound
    }
}

/// Response for a direct vendor-operation status probe.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationStatusResponse {
    pub operation_name: String,
    pub done: bool,

    /// Whether a finished artifact is ready to fetch
    pub download_ready: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_shape() {
        let resp = JobStatusResponse::not_found(JobId::from_string("missing"));
        assert_eq!(resp.status, JobState::NotFound);
        assert_eq!(resp.progress, 0);
        assert!(resp.is_terminal());
    }

    #[test]
    fn started_with_no_progress_gets_floor() {
        let meta = JobMetadata::default();
        let resp = JobStatusResponse::from_state(
            JobId::from_string("j"),
            JobState::Started,
            &meta,
        );
        assert_eq!(resp.progress, 5);
        assert_eq!(resp.current_step, "Job started, initializing...");
    }

    #[test]
    fn started_with_real_progress_kept() {
        let mut meta = JobMetadata::queued(4);
        meta.advance(2, 40, "Synthesizing speech");
        let resp = JobStatusResponse::from_state(
            JobId::from_string("j"),
            JobState::Started,
            &meta,
        );
        assert_eq!(resp.progress, 40);
        assert_eq!(resp.current_step, "Synthesizing speech");
        assert_eq!(resp.step_number, Some(2));
        assert_eq!(resp.total_steps, Some(4));
    }

    #[test]
    fn failed_resets_progress() {
        let mut meta = JobMetadata::queued(3);
        meta.advance(3, 80, "Uploading");
        meta.error = Some("vendor rejected request".to_string());
        let resp = JobStatusResponse::from_state(
            JobId::from_string("j"),
            JobState::Failed,
            &meta,
        );
        assert_eq!(resp.progress, 0);
        assert_eq!(resp.error.as_deref(), Some("vendor rejected request"));
        assert!(resp.is_terminal());
    }

    #[test]
    fn absent_urls_not_serialized() {
        let resp = JobStatusResponse::not_found(JobId::from_string("x"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("video_url"));
        assert!(!json.contains("operation_name"));
    }
}
