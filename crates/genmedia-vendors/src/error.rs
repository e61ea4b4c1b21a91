//! Vendor error types.

use thiserror::Error;

pub type VendorResult<T> = Result<T, VendorError>;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("No API key configured for {0}")]
    MissingKey(&'static str),

    #[error("{provider} API returned {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Unrecognized {provider} response shape: {detail}")]
    UnrecognizedResponse {
        provider: &'static str,
        detail: String,
    },

    #[error("Operation failed ({code}): {message}")]
    OperationFailed { code: i64, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VendorError {
    pub fn api(provider: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider,
            status,
            message: message.into(),
        }
    }

    pub fn unrecognized(provider: &'static str, detail: impl Into<String>) -> Self {
        Self::UnrecognizedResponse {
            provider,
            detail: detail.into(),
        }
    }
}
