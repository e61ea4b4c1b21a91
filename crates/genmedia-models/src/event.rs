//! Progress events published on the per-job notification channel.
//!
//! Workers publish these as a job advances; the API layer relays them to
//! WebSocket and SSE subscribers. The event names are part of the client
//! wire format.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::JobId;

/// Event kinds carried over the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobEventType {
    /// Intermediate progress update
    JobProgress,
    /// Job finished with a result
    JobComplete,
    /// Job failed with an error
    JobError,
}

impl JobEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventType::JobProgress => "job_progress",
            JobEventType::JobComplete => "job_complete",
            JobEventType::JobError => "job_error",
        }
    }
}

/// Event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Intermediate progress update
    JobProgress {
        job_id: JobId,
        /// Progress percentage (0-100)
        progress: u8,
        /// Human-readable current step
        message: String,
        /// 1-based step index
        #[serde(skip_serializing_if = "Option::is_none")]
        step_number: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_steps: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// Job finished; carries the client-facing result payload
    JobComplete {
        job_id: JobId,
        result: Value,
        timestamp: DateTime<Utc>,
    },

    /// Job failed
    JobError {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Create a progress event.
    pub fn progress(job_id: JobId, progress: u8, message: impl Into<String>) -> Self {
        JobEvent::JobProgress {
            job_id,
            progress: progress.min(100),
            message: message.into(),
            step_number: None,
            total_steps: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a progress event with step counters.
    pub fn progress_step(
        job_id: JobId,
        progress: u8,
        message: impl Into<String>,
        step_number: u32,
        total_steps: u32,
    ) -> Self {
        JobEvent::JobProgress {
            job_id,
            progress: progress.min(100),
            message: message.into(),
            step_number: Some(step_number),
            total_steps: Some(total_steps),
            timestamp: Utc::now(),
        }
    }

    /// Create a completion event.
    pub fn complete(job_id: JobId, result: Value) -> Self {
        JobEvent::JobComplete {
            job_id,
            result,
            timestamp: Utc::now(),
        }
    }

    /// Create an error event.
    pub fn error(job_id: JobId, error: impl Into<String>) -> Self {
        JobEvent::JobError {
            job_id,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// The job this event belongs to.
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::JobProgress { job_id, .. } => job_id,
            JobEvent::JobComplete { job_id, .. } => job_id,
            JobEvent::JobError { job_id, .. } => job_id,
        }
    }

    /// Get the event type.
    pub fn event_type(&self) -> JobEventType {
        match self {
            JobEvent::JobProgress { .. } => JobEventType::JobProgress,
            JobEvent::JobComplete { .. } => JobEventType::JobComplete,
            JobEvent::JobError { .. } => JobEventType::JobError,
        }
    }

    /// Whether this event ends the stream for its job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::JobProgress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_event_serialization() {
        let event = JobEvent::progress(JobId::from_string("job-1"), 150, "Synthesizing speech");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"job_progress\""));
        assert!(json.contains("\"progress\":100"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn complete_event_is_terminal() {
        let event = JobEvent::complete(
            JobId::from_string("job-2"),
            json!({"video_url": "https://storage.googleapis.com/b/v.mp4"}),
        );
        assert!(event.is_terminal());
        assert_eq!(event.event_type().as_str(), "job_complete");
        assert_eq!(event.job_id().as_str(), "job-2");
    }

    #[test]
    fn error_event_serialization() {
        let event = JobEvent::error(JobId::from_string("job-3"), "vendor rejected request");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"job_error\""));
        assert!(json.contains("vendor rejected request"));
    }
}
