//! Shared data models for the GenMedia backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job identity, kind, state and mutable metadata
//! - The tagged job outcome (submitted / video / audio)
//! - Client-facing status and submission shapes
//! - Progress events published over the notification channel
//! - Per-request credential overrides and scrubbing

pub mod credentials;
pub mod event;
pub mod job;
pub mod outcome;
pub mod request;
pub mod status;

// Re-export common types
pub use credentials::{CredentialOverrides, SENSITIVE_META_KEYS};
pub use event::{JobEvent, JobEventType};
pub use job::{JobId, JobKind, JobMetadata, JobState};
pub use outcome::{AudioArtifacts, JobOutcome};
pub use request::{
    AudioFormat, AudioOptions, CreateJobRequest, MediaRef, ScriptProvider, ValidationError,
    VideoParameters, SUPPORTED_ASPECT_RATIOS, SUPPORTED_VIDEO_MODELS,
};
pub use status::{CreateJobResponse, JobStatusResponse, OperationStatusResponse};
