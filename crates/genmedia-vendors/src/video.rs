//! Video generation via Vertex AI long-running operations.
//!
//! Submission uses `predictLongRunning`; polling uses
//! `fetchPredictOperation`. Operation responses are parsed against the
//! known wire shapes only, and anything else fails loudly instead of being
//! treated as "no videos yet".

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use genmedia_models::{MediaRef, VideoParameters};

use crate::error::{VendorError, VendorResult};

#[derive(Debug, Clone)]
pub struct VertexVideoConfig {
    pub project_id: String,
    pub region: String,
    /// Endpoint base, overridable for tests
    pub base_url: String,
}

impl VertexVideoConfig {
    pub fn new(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        let base_url = format!("https://{}-aiplatform.googleapis.com/v1", region);
        Self {
            project_id: project_id.into(),
            region,
            base_url,
        }
    }
}

/// A submitted long-running operation.
#[derive(Debug, Clone)]
pub struct SubmittedOperation {
    pub operation_name: String,
}

/// Parsed status of a long-running operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    /// Still running
    Running,
    /// Finished; URIs of the generated videos, in sample order
    Succeeded { video_uris: Vec<String> },
    /// Finished with a vendor-reported error
    Failed { code: i64, message: String },
}

pub struct VertexVideoClient {
    http: Client,
    config: VertexVideoConfig,
}

impl VertexVideoClient {
    pub fn new(config: VertexVideoConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn model_url(&self, model: &str, verb: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:{}",
            self.config.base_url, self.config.project_id, self.config.region, model, verb
        )
    }

    /// Submit a generation request. Output lands under `storage_uri`.
    pub async fn submit(
        &self,
        token: &str,
        prompt: &str,
        params: &VideoParameters,
        storage_uri: &str,
    ) -> VendorResult<SubmittedOperation> {
        let mut instance = json!({"prompt": prompt});
        if let Some(image) = &params.image {
            instance["image"] = media_ref_value(image);
        }
        if let Some(video) = &params.video {
            instance["video"] = media_ref_value(video);
        }
        if let Some(last_frame) = &params.last_frame {
            instance["lastFrame"] = media_ref_value(last_frame);
        }

        let mut parameters = json!({
            "sampleCount": params.sample_count,
            "durationSeconds": params.duration_seconds,
            "aspectRatio": params.aspect_ratio,
            "generateAudio": params.generate_audio,
            "storageUri": storage_uri,
        });
        if let Some(pg) = &params.person_generation {
            parameters["personGeneration"] = json!(pg);
        }
        if let Some(np) = &params.negative_prompt {
            parameters["negativePrompt"] = json!(np);
        }
        if let Some(res) = &params.resolution {
            parameters["resolution"] = json!(res);
        }
        if let Some(seed) = params.seed {
            parameters["seed"] = json!(seed);
        }

        let url = self.model_url(&params.model, "predictLongRunning");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({"instances": [instance], "parameters": parameters}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("vertex", status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        let operation_name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| VendorError::unrecognized("vertex", "no operation name"))?
            .to_string();

        info!(operation_name, "Submitted video generation operation");
        Ok(SubmittedOperation { operation_name })
    }

    /// Poll a previously submitted operation once.
    pub async fn poll(
        &self,
        token: &str,
        model: &str,
        operation_name: &str,
    ) -> VendorResult<OperationStatus> {
        let url = self.model_url(model, "fetchPredictOperation");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({"operationName": operation_name}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("vertex", status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        let parsed = parse_operation(&body)?;
        debug!(operation_name, ?parsed, "Polled operation");
        Ok(parsed)
    }
}

fn media_ref_value(media: &MediaRef) -> Value {
    let mut v = json!({"mimeType": media.mime_type});
    if let Some(uri) = &media.gcs_uri {
        v["gcsUri"] = json!(uri);
    }
    if let Some(bytes) = &media.bytes_base64_encoded {
        v["bytesBase64Encoded"] = json!(bytes);
    }
    v
}

/// Parse an operation document into a status.
///
/// Recognized terminal shapes:
/// - `error: {code, message}`
/// - `response.videos[].gcsUri`
/// - `response.generatedSamples[].video.uri`
///
/// A done operation whose response matches neither video shape is an
/// `UnrecognizedResponse` error, not an empty success.
pub fn parse_operation(body: &Value) -> VendorResult<OperationStatus> {
    let done = body.get("done").and_then(Value::as_bool).unwrap_or(false);

    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown operation error")
            .to_string();
        return Ok(OperationStatus::Failed { code, message });
    }

    if !done {
        return Ok(OperationStatus::Running);
    }

    let response = body
        .get("response")
        .ok_or_else(|| VendorError::unrecognized("vertex", "done operation without response"))?;

    if let Some(videos) = response.get("videos").and_then(Value::as_array) {
        let uris: Vec<String> = videos
            .iter()
            .filter_map(|v| v.get("gcsUri").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if uris.len() == videos.len() && !uris.is_empty() {
            return Ok(OperationStatus::Succeeded { video_uris: uris });
        }
    }

    if let Some(samples) = response.get("generatedSamples").and_then(Value::as_array) {
        let uris: Vec<String> = samples
            .iter()
            .filter_map(|s| {
                s.get("video")
                    .and_then(|v| v.get("uri"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .collect();
        if uris.len() == samples.len() && !uris.is_empty() {
            return Ok(OperationStatus::Succeeded { video_uris: uris });
        }
    }

    Err(VendorError::unrecognized(
        "vertex",
        format!("done operation with unexpected response keys: {}", response),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn running_operation() {
        let body = json!({"name": "op-1", "done": false});
        assert_eq!(parse_operation(&body).unwrap(), OperationStatus::Running);
    }

    #[test]
    fn videos_shape_parsed() {
        let body = json!({
            "name": "op-1",
            "done": true,
            "response": {"videos": [
                {"gcsUri": "gs://b/videos/j/sample_0.mp4"},
                {"gcsUri": "gs://b/videos/j/sample_1.mp4"}
            ]}
        });
        assert_eq!(
            parse_operation(&body).unwrap(),
            OperationStatus::Succeeded {
                video_uris: vec![
                    "gs://b/videos/j/sample_0.mp4".into(),
                    "gs://b/videos/j/sample_1.mp4".into()
                ]
            }
        );
    }

    #[test]
    fn generated_samples_shape_parsed() {
        let body = json!({
            "name": "op-1",
            "done": true,
            "response": {"generatedSamples": [
                {"video": {"uri": "gs://b/videos/j/sample_0.mp4"}}
            ]}
        });
        assert_eq!(
            parse_operation(&body).unwrap(),
            OperationStatus::Succeeded {
                video_uris: vec!["gs://b/videos/j/sample_0.mp4".into()]
            }
        );
    }

    #[test]
    fn vendor_error_surfaces_code_and_message() {
        let body = json!({
            "name": "op-1",
            "done": true,
            "error": {"code": 3, "message": "prompt violated policy"}
        });
        assert_eq!(
            parse_operation(&body).unwrap(),
            OperationStatus::Failed {
                code: 3,
                message: "prompt violated policy".into()
            }
        );
    }

    #[test]
    fn unknown_done_shape_fails_loudly() {
        let body = json!({
            "name": "op-1",
            "done": true,
            "response": {"somethingElse": []}
        });
        let err = parse_operation(&body).unwrap_err();
        assert!(matches!(err, VendorError::UnrecognizedResponse { .. }));
    }

    #[test]
    fn done_without_response_fails_loudly() {
        let body = json!({"name": "op-1", "done": true});
        assert!(parse_operation(&body).is_err());
    }

    #[tokio::test]
    async fn submit_and_poll_round_trip() {
        use wiremock::matchers::{body_partial_json, method, path_regex};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":predictLongRunning$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "op-42"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":fetchPredictOperation$"))
            .and(body_partial_json(json!({"operationName": "op-42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-42",
                "done": true,
                "response": {"videos": [{"gcsUri": "gs://b/videos/j/sample_0.mp4"}]}
            })))
            .mount(&server)
            .await;

        let mut config = VertexVideoConfig::new("proj", "us-central1");
        config.base_url = server.uri();
        let client = VertexVideoClient::new(config);

        let params = VideoParameters::default();
        let op = client
            .submit("tok", "a storm over the sea", &params, "gs://b/videos/j/")
            .await
            .unwrap();
        assert_eq!(op.operation_name, "op-42");

        let status = client.poll("tok", &params.model, "op-42").await.unwrap();
        assert!(matches!(status, OperationStatus::Succeeded { .. }));
    }
}
