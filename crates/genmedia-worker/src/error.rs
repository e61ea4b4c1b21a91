//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Script generation failed: {0}")]
    ScriptFailed(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Video generation failed: {0}")]
    VideoFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Vendor error: {0}")]
    Vendor(#[from] genmedia_vendors::VendorError),

    #[error("Storage error: {0}")]
    Storage(#[from] genmedia_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] genmedia_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn script_failed(msg: impl Into<String>) -> Self {
        Self::ScriptFailed(msg.into())
    }

    pub fn synthesis_failed(msg: impl Into<String>) -> Self {
        Self::SynthesisFailed(msg.into())
    }

    pub fn video_failed(msg: impl Into<String>) -> Self {
        Self::VideoFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: WorkerError = parse.into();
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
