//! Per-request credential overrides.
//!
//! Callers may supply their own keys for the generation backends; anything
//! not supplied falls back to server environment configuration. The OpenAI
//! key is always server-side and never accepted from clients.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata keys that must never survive into a terminal job state.
pub const SENSITIVE_META_KEYS: &[&str] = &[
    "gemini_api_key",
    "openai_api_key",
    "google_cloud_credentials",
    "elevenlabs_api_key",
    "credentials",
];

/// Caller-supplied credential overrides, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CredentialOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    /// Service-account JSON, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_cloud_credentials: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_cloud_project: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_ai_region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevenlabs_api_key: Option<String>,
}

impl CredentialOverrides {
    pub fn is_empty(&self) -> bool {
        self.gemini_api_key.is_none()
            && self.google_cloud_credentials.is_none()
            && self.google_cloud_project.is_none()
            && self.vertex_ai_region.is_none()
            && self.gcs_bucket.is_none()
            && self.elevenlabs_api_key.is_none()
    }
}
