//! Text-to-speech via the ElevenLabs API.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{VendorError, VendorResult};

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Known-good narrator voice, used when the voice listing yields nothing.
const FALLBACK_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// Voice names preferred for narration, in order.
const PREFERRED_VOICES: &[&str] = &["Rachel", "Adam", "Bella", "Antoni"];

pub struct ElevenLabsClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Debug, Deserialize)]
struct Voice {
    voice_id: String,
    name: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
        }
    }

    /// Override the endpoint base, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Pick a narration voice. Prefers a known name from the account's
    /// voice list, then any listed voice, then a hardcoded fallback. Never
    /// fails: a listing error only degrades the choice.
    pub async fn select_voice(&self) -> String {
        let voices = match self.list_voices().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Voice listing failed, using fallback voice: {}", e);
                return FALLBACK_VOICE_ID.to_string();
            }
        };

        for preferred in PREFERRED_VOICES {
            if let Some(v) = voices.iter().find(|v| v.name == *preferred) {
                debug!("Selected preferred voice {} ({})", v.name, v.voice_id);
                return v.voice_id.clone();
            }
        }

        match voices.first() {
            Some(v) => {
                debug!("Selected first available voice {} ({})", v.name, v.voice_id);
                v.voice_id.clone()
            }
            None => FALLBACK_VOICE_ID.to_string(),
        }
    }

    async fn list_voices(&self) -> VendorResult<Vec<Voice>> {
        let url = format!("{}/v1/voices", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("elevenlabs", status.as_u16(), body));
        }

        let parsed: VoicesResponse = response.json().await?;
        Ok(parsed.voices)
    }

    /// Synthesize `script` with `voice_id`, returning MP3 bytes.
    pub async fn synthesize(&self, voice_id: &str, script: &str) -> VendorResult<Vec<u8>> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&serde_json::json!({
                "text": script,
                "model_id": "eleven_multilingual_v2",
                "voice_settings": {"stability": 0.5, "similarity_boost": 0.75}
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("elevenlabs", status.as_u16(), body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn preferred_voice_selected_over_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "voices": [
                    {"voice_id": "v-other", "name": "Custom"},
                    {"voice_id": "v-rachel", "name": "Rachel"}
                ]
            })))
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("key").with_base_url(server.uri());
        assert_eq!(client.select_voice().await, "v-rachel");
    }

    #[tokio::test]
    async fn listing_failure_degrades_to_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("key").with_base_url(server.uri());
        assert_eq!(client.select_voice().await, FALLBACK_VOICE_ID);
    }

    #[tokio::test]
    async fn empty_listing_degrades_to_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"voices": []})))
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("key").with_base_url(server.uri());
        assert_eq!(client.select_voice().await, FALLBACK_VOICE_ID);
    }
}
