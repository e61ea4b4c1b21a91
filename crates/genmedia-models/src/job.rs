//! Job identity, kind, queue state and mutable metadata.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::credentials::SENSITIVE_META_KEYS;

/// Unique identifier for a job. Generated by the submitting side, not the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of artifact a job produces. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Video,
    Audio,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Video => "video",
            JobKind::Audio => "audio",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue-derived job state.
///
/// `NotFound` is a query-time answer for unknown ids, never a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in the queue
    #[default]
    Queued,
    /// Job has been claimed by a worker
    Started,
    /// Job completed and a result is stored
    Finished,
    /// Job raised an error
    Failed,
    /// Unknown job id (derived, query-time only)
    NotFound,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Started => "started",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
            JobState::NotFound => "not_found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable job metadata, written incrementally by the pipeline executor and
/// read by the API layer. Single writer per job; readers tolerate
/// field-by-field eventual consistency.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobMetadata {
    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Human-readable description of the current step
    #[serde(default)]
    pub current_step: String,

    /// 1-based index of the current step
    #[serde(default)]
    pub step_number: u32,

    /// Number of steps in the pipeline
    #[serde(default)]
    pub total_steps: u32,

    /// Vendor long-running-operation handle, if one was submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Error message recorded on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Anything else the executor stashed (including transient credential
    /// material, which must be scrubbed before any terminal state).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobMetadata {
    /// Fresh metadata for a newly submitted job.
    pub fn queued(total_steps: u32) -> Self {
        Self {
            progress: 0,
            current_step: "Job queued, waiting to start".to_string(),
            step_number: 0,
            total_steps,
            ..Default::default()
        }
    }

    /// Record a step transition.
    pub fn advance(&mut self, step_number: u32, progress: u8, current_step: impl Into<String>) {
        self.step_number = step_number;
        self.progress = progress.min(100);
        self.current_step = current_step.into();
    }

    /// Remove credential-shaped keys. Must be applied on every exit path
    /// before a job becomes externally visible in a terminal state.
    pub fn scrub_credentials(&mut self) {
        for key in SENSITIVE_META_KEYS {
            self.extra.remove(*key);
        }
    }

    /// Check whether any credential-shaped key is still present.
    pub fn has_credentials(&self) -> bool {
        SENSITIVE_META_KEYS.iter().any(|k| self.extra.contains_key(*k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::from_string("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobState::NotFound).unwrap(), "\"not_found\"");
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Started.is_terminal());
    }

    #[test]
    fn scrub_removes_all_credential_keys() {
        let mut meta = JobMetadata::queued(4);
        meta.extra.insert("gemini_api_key".into(), json!("sk-secret"));
        meta.extra.insert("openai_api_key".into(), json!("sk-other"));
        meta.extra.insert("google_cloud_credentials".into(), json!({"private_key": "x"}));
        meta.extra.insert("elevenlabs_api_key".into(), json!("xi-key"));
        meta.extra.insert("credentials".into(), json!({}));
        meta.extra.insert("harmless".into(), json!("keep"));

        assert!(meta.has_credentials());
        meta.scrub_credentials();
        assert!(!meta.has_credentials());
        assert_eq!(meta.extra.get("harmless"), Some(&json!("keep")));
    }

    #[test]
    fn advance_clamps_progress() {
        let mut meta = JobMetadata::queued(3);
        meta.advance(2, 150, "Uploading");
        assert_eq!(meta.progress, 100);
        assert_eq!(meta.step_number, 2);
        assert_eq!(meta.current_step, "Uploading");
    }
}
