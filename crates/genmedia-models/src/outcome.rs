//! Terminal job results.
//!
//! The outcome is a tagged enum so "vendor operation submitted but not yet
//! complete" is a first-class state rather than a convention layered on top
//! of generic metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Write-once terminal result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    /// A long-running vendor operation was submitted but had not completed
    /// when the worker released the job. The queue records the job as
    /// finished; clients see it as still in progress until the operation is
    /// resolved out of band.
    Submitted { operation_name: String },

    /// Video generation completed with a stored artifact.
    Video { video_url: String },

    /// Audio generation completed with one or more stored artifacts.
    Audio { artifacts: AudioArtifacts },
}

impl JobOutcome {
    /// Whether the underlying work is actually done from the client's point
    /// of view.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, JobOutcome::Submitted { .. })
    }

    pub fn operation_name(&self) -> Option<&str> {
        match self {
            JobOutcome::Submitted { operation_name } => Some(operation_name),
            _ => None,
        }
    }
}

/// URLs and metadata produced by the audio pipeline.
///
/// `audio_url` always points at the canonical intermediate format; the
/// display/download pair may point at a transcoded variant, or fall back to
/// the canonical URL when transcoding was skipped or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioArtifacts {
    pub audio_url: String,

    pub display_audio_url: String,

    pub download_audio_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_outcome_tags() {
        let outcome = JobOutcome::Submitted {
            operation_name: "projects/p/operations/op-1".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"kind\":\"submitted\""));
        assert!(!outcome.is_resolved());
        assert_eq!(outcome.operation_name(), Some("projects/p/operations/op-1"));
    }

    #[test]
    fn audio_outcome_omits_absent_fields() {
        let outcome = JobOutcome::Audio {
            artifacts: AudioArtifacts {
                audio_url: "gs://b/audio/x.mp3".into(),
                display_audio_url: "gs://b/audio/x.mp3".into(),
                download_audio_url: "gs://b/audio/x.mp3".into(),
                thumbnail_url: None,
                audio_duration_seconds: Some(12.5),
            },
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(!json.contains("thumbnail_url"));
        assert!(json.contains("\"audio_duration_seconds\":12.5"));
        assert!(outcome.is_resolved());
    }
}
