//! Shared processing context and per-job credential resolution.

use std::sync::Arc;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde_json::Value;
use tracing::warn;

use genmedia_models::CredentialOverrides;
use genmedia_queue::ProgressChannel;
use genmedia_storage::{GcsClient, StorageConfig, TokenCache};
use genmedia_vendors::{
    ElevenLabsClient, ImagenClient, ScriptClient, VertexVideoClient, VertexVideoConfig,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Server-side credentials and defaults, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ServerCredentials {
    pub gemini_api_key: Option<String>,
    /// Never accepted from clients
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub google_cloud_project: Option<String>,
    pub vertex_ai_region: String,
    pub gcs_bucket: Option<String>,
}

impl ServerCredentials {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            elevenlabs_api_key: std::env::var("ELEVENLABS_API_KEY").ok(),
            google_cloud_project: std::env::var("GOOGLE_CLOUD_PROJECT").ok(),
            vertex_ai_region: std::env::var("VERTEX_AI_REGION")
                .unwrap_or_else(|_| "us-central1".to_string()),
            gcs_bucket: std::env::var("GCS_BUCKET").ok(),
        }
    }
}

/// Credentials effective for one job: caller overrides where given, server
/// configuration everywhere else.
#[derive(Debug, Clone)]
pub struct JobCredentials {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub google_cloud_credentials: Option<Value>,
    pub google_cloud_project: Option<String>,
    pub vertex_ai_region: String,
    pub gcs_bucket: Option<String>,
}

impl JobCredentials {
    pub fn resolve(server: &ServerCredentials, overrides: Option<&CredentialOverrides>) -> Self {
        let o = overrides.cloned().unwrap_or_default();
        Self {
            gemini_api_key: o.gemini_api_key.or_else(|| server.gemini_api_key.clone()),
            openai_api_key: server.openai_api_key.clone(),
            elevenlabs_api_key: o
                .elevenlabs_api_key
                .or_else(|| server.elevenlabs_api_key.clone()),
            google_cloud_credentials: o.google_cloud_credentials,
            google_cloud_project: o
                .google_cloud_project
                .or_else(|| server.google_cloud_project.clone()),
            vertex_ai_region: o
                .vertex_ai_region
                .unwrap_or_else(|| server.vertex_ai_region.clone()),
            gcs_bucket: o.gcs_bucket.or_else(|| server.gcs_bucket.clone()),
        }
    }

    pub fn project_id(&self) -> WorkerResult<&str> {
        self.google_cloud_project
            .as_deref()
            .ok_or_else(|| WorkerError::config_error("No Google Cloud project configured"))
    }

    pub fn bucket(&self) -> WorkerResult<&str> {
        self.gcs_bucket
            .as_deref()
            .ok_or_else(|| WorkerError::config_error("No storage bucket configured"))
    }
}

/// Long-lived context shared by all pipeline runs.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub progress: ProgressChannel,
    server: ServerCredentials,
    default_token_cache: Option<Arc<TokenCache>>,
}

impl ProcessingContext {
    pub fn new(config: WorkerConfig, progress: ProgressChannel) -> Self {
        let server = ServerCredentials::from_env();
        let default_token_cache = match CustomServiceAccount::from_env() {
            Ok(Some(sa)) => Some(Arc::new(TokenCache::new(Arc::new(sa)))),
            Ok(None) => {
                warn!("GOOGLE_APPLICATION_CREDENTIALS not set; jobs must supply credentials");
                None
            }
            Err(e) => {
                warn!("Failed to load service account: {}", e);
                None
            }
        };

        Self {
            config,
            progress,
            server,
            default_token_cache,
        }
    }

    pub fn resolve_credentials(&self, overrides: Option<&CredentialOverrides>) -> JobCredentials {
        JobCredentials::resolve(&self.server, overrides)
    }

    /// Access token for Vertex and Storage calls under this job's identity.
    pub async fn gcp_token(&self, creds: &JobCredentials) -> WorkerResult<String> {
        if let Some(json) = &creds.google_cloud_credentials {
            let raw = serde_json::to_string(json)
                .map_err(|e| WorkerError::config_error(e.to_string()))?;
            let sa = CustomServiceAccount::from_json(&raw)
                .map_err(|e| WorkerError::config_error(format!("Invalid service account: {}", e)))?;
            let token = sa
                .token(&[genmedia_storage::token_cache::CLOUD_PLATFORM_SCOPE])
                .await
                .map_err(|e| WorkerError::config_error(format!("Token exchange failed: {}", e)))?;
            return Ok(token.as_str().to_string());
        }

        match &self.default_token_cache {
            Some(cache) => Ok(cache.get_token().await?),
            None => Err(WorkerError::config_error(
                "No Google Cloud credentials available for this job",
            )),
        }
    }

    pub fn storage_client(&self, creds: &JobCredentials) -> WorkerResult<GcsClient> {
        let config = StorageConfig::for_bucket(creds.bucket()?);
        match &creds.google_cloud_credentials {
            Some(json) => Ok(GcsClient::from_service_account_json(config, json)?),
            None => Ok(GcsClient::new(config)?),
        }
    }

    pub fn script_client(&self, creds: &JobCredentials) -> ScriptClient {
        ScriptClient::new(creds.gemini_api_key.clone(), creds.openai_api_key.clone())
    }

    pub fn speech_client(&self, creds: &JobCredentials) -> WorkerResult<ElevenLabsClient> {
        let key = creds
            .elevenlabs_api_key
            .as_deref()
            .ok_or_else(|| WorkerError::config_error("No ElevenLabs API key configured"))?;
        Ok(ElevenLabsClient::new(key))
    }

    pub fn image_client(&self, creds: &JobCredentials) -> WorkerResult<ImagenClient> {
        Ok(ImagenClient::new(
            creds.project_id()?,
            creds.vertex_ai_region.clone(),
        ))
    }

    pub fn video_client(&self, creds: &JobCredentials) -> WorkerResult<VertexVideoClient> {
        Ok(VertexVideoClient::new(VertexVideoConfig::new(
            creds.project_id()?,
            creds.vertex_ai_region.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let server = ServerCredentials {
            gemini_api_key: Some("server-gem".into()),
            openai_api_key: Some("server-oai".into()),
            elevenlabs_api_key: None,
            google_cloud_project: Some("server-proj".into()),
            vertex_ai_region: "us-central1".into(),
            gcs_bucket: Some("server-bucket".into()),
        };
        let overrides = CredentialOverrides {
            gemini_api_key: Some("caller-gem".into()),
            gcs_bucket: Some("caller-bucket".into()),
            ..Default::default()
        };

        let creds = JobCredentials::resolve(&server, Some(&overrides));
        assert_eq!(creds.gemini_api_key.as_deref(), Some("caller-gem"));
        assert_eq!(creds.gcs_bucket.as_deref(), Some("caller-bucket"));
        assert_eq!(creds.google_cloud_project.as_deref(), Some("server-proj"));
    }

    #[test]
    fn openai_key_is_always_server_side() {
        let server = ServerCredentials {
            openai_api_key: Some("server-oai".into()),
            vertex_ai_region: "us-central1".into(),
            ..Default::default()
        };
        let creds = JobCredentials::resolve(&server, None);
        assert_eq!(creds.openai_api_key.as_deref(), Some("server-oai"));
    }
}
