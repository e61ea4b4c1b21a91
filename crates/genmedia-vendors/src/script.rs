//! Script generation via Gemini or OpenAI.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use genmedia_models::ScriptProvider;

use crate::error::{VendorError, VendorResult};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Gemini models tried in order until one answers.
const GEMINI_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash"];

const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Script generation client, dispatching on the configured provider.
pub struct ScriptClient {
    http: Client,
    gemini_api_key: Option<String>,
    openai_api_key: Option<String>,
    gemini_base_url: String,
    openai_base_url: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

impl ScriptClient {
    pub fn new(gemini_api_key: Option<String>, openai_api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            gemini_api_key,
            openai_api_key,
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Override the endpoint bases, for tests.
    pub fn with_base_urls(mut self, gemini: impl Into<String>, openai: impl Into<String>) -> Self {
        self.gemini_base_url = gemini.into();
        self.openai_base_url = openai.into();
        self
    }

    /// Generate a spoken script for `prompt`, bounded to roughly
    /// `target_duration_seconds` of speech.
    pub async fn generate(
        &self,
        provider: ScriptProvider,
        prompt: &str,
        target_duration_seconds: Option<u32>,
    ) -> VendorResult<String> {
        let instruction = build_instruction(prompt, target_duration_seconds);
        self.complete(provider, &instruction).await
    }

    /// Run a raw completion on the given provider.
    pub async fn complete(
        &self,
        provider: ScriptProvider,
        instruction: &str,
    ) -> VendorResult<String> {
        match provider {
            ScriptProvider::Gemini => self.generate_gemini(instruction).await,
            ScriptProvider::OpenAi => self.generate_openai(instruction).await,
        }
    }

    async fn generate_gemini(&self, instruction: &str) -> VendorResult<String> {
        let api_key = self
            .gemini_api_key
            .as_deref()
            .ok_or(VendorError::MissingKey("gemini"))?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: instruction.to_string(),
                }],
            }],
        };

        let mut last_error = None;

        for model in GEMINI_MODELS {
            info!("Attempting script generation with model: {}", model);
            let url = format!(
                "{}/models/{}:generateContent?key={}",
                self.gemini_base_url, model, api_key
            );
            match self.call_gemini(&url, &request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| VendorError::unrecognized("gemini", "all models failed")))
    }

    async fn call_gemini(&self, url: &str, request: &GeminiRequest) -> VendorResult<String> {
        let response = self.http.post(url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("gemini", status.as_u16(), body));
        }

        let parsed: GeminiResponse = response.json().await?;
        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| VendorError::unrecognized("gemini", "no candidate content"))?;

        Ok(strip_code_fences(text).to_string())
    }

    async fn generate_openai(&self, instruction: &str) -> VendorResult<String> {
        let api_key = self
            .openai_api_key
            .as_deref()
            .ok_or(VendorError::MissingKey("openai"))?;

        let request = OpenAiRequest {
            model: OPENAI_MODEL,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: "You write natural spoken-word scripts for narration. \
                              Output plain prose only, no stage directions or markdown.",
                },
                OpenAiMessage {
                    role: "user",
                    content: instruction,
                },
            ],
        };

        let url = format!("{}/chat/completions", self.openai_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::api("openai", status.as_u16(), body));
        }

        let parsed: OpenAiResponse = response.json().await?;
        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| VendorError::unrecognized("openai", "no choices"))?;

        Ok(strip_code_fences(text).to_string())
    }
}

fn build_instruction(prompt: &str, target_duration_seconds: Option<u32>) -> String {
    let duration_line = match target_duration_seconds {
        Some(secs) => format!(
            "The script should take about {} seconds to read aloud at a natural pace.",
            secs
        ),
        None => "Keep the script concise, under two minutes of speech.".to_string(),
    };
    format!(
        "Write a spoken-word script on the following topic. {}\n\
         Return only the words to be spoken, with no headings, lists or markdown.\n\n\
         Topic: {}",
        duration_line, prompt
    )
}

/// Strip a surrounding markdown code fence if the model wrapped its output
/// in one.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_stripped() {
        assert_eq!(strip_code_fences("```\nhello world\n```"), "hello world");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("plain text"), "plain text");
    }

    #[test]
    fn instruction_includes_duration() {
        let inst = build_instruction("tides", Some(45));
        assert!(inst.contains("45 seconds"));
        assert!(inst.contains("tides"));
    }

    #[tokio::test]
    async fn missing_gemini_key_fails_before_network() {
        let client = ScriptClient::new(None, Some("sk-x".into()));
        let err = client
            .generate(ScriptProvider::Gemini, "anything", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::MissingKey("gemini")));
    }

    #[tokio::test]
    async fn missing_openai_key_fails_before_network() {
        let client = ScriptClient::new(Some("g-x".into()), None);
        let err = client
            .generate(ScriptProvider::OpenAi, "anything", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::MissingKey("openai")));
    }
}
