//! Queue job payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use genmedia_models::{CreateJobRequest, JobId, JobKind};

/// The payload carried on the job stream. The full submission travels with
/// the job so workers need no second lookup to start executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub request: CreateJobRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job_id: JobId, request: CreateJobRequest) -> Self {
        Self {
            job_id,
            request,
            enqueued_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.request.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrip() {
        let job = QueuedJob::new(
            JobId::from_string("j-1"),
            CreateJobRequest {
                mode: JobKind::Audio,
                prompt: "a minute on tidal locking".into(),
                parameters: None,
                audio: None,
                credentials: None,
            },
        );
        let json = serde_json::to_string(&job).unwrap();
        let back: QueuedJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id.as_str(), "j-1");
        assert_eq!(back.kind(), JobKind::Audio);
    }
}
