//! Thumbnail image generation via Vertex AI Imagen.

use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{VendorError, VendorResult};

const IMAGEN_MODEL: &str = "imagen-3.0-generate-002";

pub struct ImagenClient {
    http: Client,
    project_id: String,
    region: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

impl ImagenClient {
    pub fn new(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        let base_url = format!("https://{}-aiplatform.googleapis.com/v1", region);
        Self {
            http: Client::new(),
            project_id: project_id.into(),
            region,
            base_url,
        }
    }

    /// Override the endpoint base, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate a square image for `prompt`, returning PNG bytes.
    pub async fn generate(&self, token: &str, prompt: &str) -> VendorResult<Vec<u8>> {
        let url = format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.base_url, self.project_id, self.region, IMAGEN_MODEL
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "instances": [{"prompt": prompt}],
                "parameters": {"sampleCount": 1, "aspectRatio": "1:1"}
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("imagen", status.as_u16(), body));
        }

        let parsed: PredictResponse = response.json().await?;
        let encoded = parsed
            .predictions
            .first()
            .and_then(|p| p.bytes_base64_encoded.as_deref())
            .ok_or_else(|| VendorError::unrecognized("imagen", "no image bytes in prediction"))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| VendorError::unrecognized("imagen", format!("invalid base64: {}", e)))?;

        debug!("Generated thumbnail ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn decodes_prediction_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":predict$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "predictions": [{"bytesBase64Encoded": "aGVsbG8="}]
            })))
            .mount(&server)
            .await;

        let client = ImagenClient::new("proj", "us-central1").with_base_url(server.uri());
        let bytes = client.generate("tok", "a podcast cover").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn empty_prediction_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":predict$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"predictions": []})),
            )
            .mount(&server)
            .await;

        let client = ImagenClient::new("proj", "us-central1").with_base_url(server.uri());
        let err = client.generate("tok", "x").await.unwrap_err();
        assert!(matches!(err, VendorError::UnrecognizedResponse { .. }));
    }
}
