//! Cloud Storage JSON API client.

use std::sync::Arc;
use std::time::Duration;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::token_cache::TokenCache;

/// Storage client configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Bucket for generated artifacts
    pub bucket: String,
    /// Request timeout
    pub timeout: Duration,
    /// Upload endpoint base, overridable for tests
    pub upload_base_url: String,
    /// API endpoint base, overridable for tests
    pub api_base_url: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let bucket = std::env::var("GCS_BUCKET")
            .map_err(|_| StorageError::auth_error("GCS_BUCKET must be set"))?;
        if bucket.is_empty() {
            return Err(StorageError::auth_error("GCS_BUCKET cannot be empty"));
        }

        Ok(Self {
            bucket,
            timeout: Duration::from_secs(
                std::env::var("GCS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            upload_base_url: "https://storage.googleapis.com/upload/storage/v1".to_string(),
            api_base_url: "https://storage.googleapis.com/storage/v1".to_string(),
        })
    }

    /// Config for a specific bucket, keeping defaults for everything else.
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            timeout: Duration::from_secs(120),
            upload_base_url: "https://storage.googleapis.com/upload/storage/v1".to_string(),
            api_base_url: "https://storage.googleapis.com/storage/v1".to_string(),
        }
    }
}

/// Cloud Storage client.
pub struct GcsClient {
    http: Client,
    config: StorageConfig,
    token_cache: Arc<TokenCache>,
}

impl Clone for GcsClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl GcsClient {
    /// Create a new client with credentials from the environment.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        let auth = Self::auth_from_env()?;
        Self::with_auth(config, auth)
    }

    /// Create a client from inline service-account JSON, as supplied in
    /// per-request credential overrides.
    pub fn from_service_account_json(
        config: StorageConfig,
        credentials: &Value,
    ) -> StorageResult<Self> {
        let json = serde_json::to_string(credentials)?;
        let sa = CustomServiceAccount::from_json(&json)
            .map_err(|e| StorageError::auth_error(format!("Invalid service account: {}", e)))?;
        Self::with_auth(config, Arc::new(sa))
    }

    /// Create a client around an already-loaded token provider, so callers
    /// holding a service account can share it instead of reloading it.
    pub fn with_token_provider(
        config: StorageConfig,
        auth: Arc<dyn TokenProvider>,
    ) -> StorageResult<Self> {
        Self::with_auth(config, auth)
    }

    fn with_auth(config: StorageConfig, auth: Arc<dyn TokenProvider>) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("genmedia-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StorageError::Network)?;

        Ok(Self {
            http,
            config,
            token_cache: Arc::new(TokenCache::new(auth)),
        })
    }

    fn auth_from_env() -> StorageResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| StorageError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(StorageError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Upload bytes to `key` and return its public URL.
    ///
    /// The object is made publicly readable on a best-effort basis; the
    /// returned URL is valid either way when the bucket grants uniform
    /// public access.
    pub async fn upload_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        let token = self.token_cache.get_token().await?;
        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.config.upload_base_url,
            self.config.bucket,
            urlencode(key)
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::UploadFailed(format!(
                "{} uploading {}: {}",
                status, key, body
            )));
        }

        debug!(key, bucket = %self.config.bucket, "Uploaded object");
        self.grant_public_read(&self.config.bucket, key).await;
        Ok(self.public_url(key))
    }

    /// Resolve a storage URI to its public URL, first attempting a public
    /// grant on the object. Vendor-written outputs never pass through the
    /// upload path, so this is their only chance at a grant. Non-storage
    /// URIs pass through untouched.
    pub async fn publish_uri(&self, uri: &str) -> String {
        if let Some((bucket, key)) = split_gs_uri(uri) {
            self.grant_public_read(bucket, key).await;
        }
        resolve_public_url(uri)
    }

    /// Insert a public-read ACL on the object. Buckets with uniform
    /// bucket-level access reject per-object ACLs; that is not an error
    /// because such buckets manage public access themselves.
    async fn grant_public_read(&self, bucket: &str, key: &str) {
        let token = match self.token_cache.get_token().await {
            Ok(t) => t,
            Err(e) => {
                warn!(key, "Skipping public ACL, no token: {}", e);
                return;
            }
        };

        let url = format!(
            "{}/b/{}/o/{}/acl",
            self.config.api_base_url,
            bucket,
            urlencode(key)
        );

        let result = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({"entity": "allUsers", "role": "READER"}))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                debug!(key, status = %resp.status(), "Public ACL not applied");
            }
            Err(e) => warn!(key, "Public ACL request failed: {}", e),
        }
    }

    /// Canonical public URL for an object in this bucket.
    pub fn public_url(&self, key: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.config.bucket, key)
    }

    /// Fetch an object's bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let token = self.token_cache.get_token().await?;
        let url = format!(
            "{}/b/{}/o/{}?alt=media",
            self.config.api_base_url,
            self.config.bucket,
            urlencode(key)
        );

        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Rewrite a `gs://bucket/path` URI to its public HTTPS form. Anything that
/// is not a `gs://` URI passes through unchanged, so applying this twice is
/// a no-op.
pub fn resolve_public_url(uri: &str) -> String {
    match uri.strip_prefix("gs://") {
        Some(rest) => format!("https://storage.googleapis.com/{}", rest),
        None => uri.to_string(),
    }
}

/// Split a `gs://bucket/key` URI into bucket and object key.
fn split_gs_uri(uri: &str) -> Option<(&str, &str)> {
    uri.strip_prefix("gs://")?
        .split_once('/')
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gs_uri_resolves_to_https() {
        assert_eq!(
            resolve_public_url("gs://my-bucket/videos/job-1/sample_0.mp4"),
            "https://storage.googleapis.com/my-bucket/videos/job-1/sample_0.mp4"
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let once = resolve_public_url("gs://b/a.mp3");
        let twice = resolve_public_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_gs_uri_passes_through() {
        let url = "https://example.com/a.mp4";
        assert_eq!(resolve_public_url(url), url);
    }

    #[test]
    fn object_keys_are_encoded() {
        assert_eq!(urlencode("audio/job 1/a.mp3"), "audio%2Fjob+1%2Fa.mp3");
    }

    #[test]
    fn gs_uri_splits_into_bucket_and_key() {
        assert_eq!(
            split_gs_uri("gs://my-bucket/videos/job-1/sample_0.mp4"),
            Some(("my-bucket", "videos/job-1/sample_0.mp4"))
        );
        assert_eq!(split_gs_uri("https://example.com/a.mp4"), None);
        assert_eq!(split_gs_uri("gs://bucket-only"), None);
        assert_eq!(split_gs_uri("gs:///no-bucket"), None);
    }
}
