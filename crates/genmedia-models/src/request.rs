//! Job submission shapes and synchronous parameter validation.
//!
//! Invalid parameter combinations are rejected here, before any job id is
//! created or anything is enqueued.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialOverrides;
use crate::job::JobKind;

/// Video generation models the gateway accepts.
pub const SUPPORTED_VIDEO_MODELS: &[&str] = &[
    "veo-3.0-generate-preview",
    "veo-2.0-generate-preview",
    "veo-1.0-generate-preview",
];

/// Aspect ratios the gateway accepts.
pub const SUPPORTED_ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1", "4:3", "3:4"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Body of a job submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateJobRequest {
    /// Which pipeline to run
    pub mode: JobKind,

    /// The generation prompt
    pub prompt: String,

    /// Video-specific parameters (ignored for audio jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<VideoParameters>,

    /// Audio-specific options (ignored for video jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOptions>,

    /// Caller-supplied credential overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialOverrides>,
}

impl CreateJobRequest {
    /// Validate the request before enqueueing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::new("Prompt must not be empty"));
        }
        if let (JobKind::Video, Some(params)) = (self.mode, self.parameters.as_ref()) {
            params.validate()?;
        }
        Ok(())
    }

    /// Number of pipeline steps the submitted job will run.
    pub fn total_steps(&self) -> u32 {
        match self.mode {
            JobKind::Video => 3,
            JobKind::Audio => {
                let thumbnail = self
                    .audio
                    .as_ref()
                    .map(|a| a.generate_thumbnail)
                    .unwrap_or(false);
                if thumbnail {
                    5
                } else {
                    4
                }
            }
        }
    }
}

/// Video generation parameters. Field names follow the wire format of the
/// generation backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    #[serde(default = "default_duration")]
    pub duration_seconds: u32,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    #[serde(default = "default_sample_count")]
    pub sample_count: u32,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_generate_audio")]
    pub generate_audio: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_generation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,

    /// Optional conditioning image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaRef>,

    /// Optional conditioning video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaRef>,

    /// Optional last-frame conditioning image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<MediaRef>,
}

fn default_duration() -> u32 {
    8
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_sample_count() -> u32 {
    1
}

fn default_model() -> String {
    "veo-3.0-generate-preview".to_string()
}

fn default_generate_audio() -> bool {
    true
}

impl Default for VideoParameters {
    fn default() -> Self {
        Self {
            duration_seconds: default_duration(),
            aspect_ratio: default_aspect_ratio(),
            sample_count: default_sample_count(),
            model: default_model(),
            generate_audio: default_generate_audio(),
            person_generation: None,
            negative_prompt: None,
            resolution: None,
            seed: None,
            image: None,
            video: None,
            last_frame: None,
        }
    }
}

impl VideoParameters {
    /// Validate model selection, duration, aspect ratio and sample count.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !SUPPORTED_VIDEO_MODELS.contains(&self.model.as_str()) {
            return Err(ValidationError::new(format!(
                "Unsupported video model '{}'. Supported models: {}",
                self.model,
                SUPPORTED_VIDEO_MODELS.join(", ")
            )));
        }
        if self.duration_seconds < 1 || self.duration_seconds > 60 {
            return Err(ValidationError::new(
                "Duration must be between 1 and 60 seconds",
            ));
        }
        if !SUPPORTED_ASPECT_RATIOS.contains(&self.aspect_ratio.as_str()) {
            return Err(ValidationError::new(format!(
                "Unsupported aspect ratio '{}'. Supported ratios: {}",
                self.aspect_ratio,
                SUPPORTED_ASPECT_RATIOS.join(", ")
            )));
        }
        if self.sample_count < 1 || self.sample_count > 4 {
            return Err(ValidationError::new(
                "Sample count must be between 1 and 4",
            ));
        }
        Ok(())
    }
}

/// Reference to a conditioning media input: either already in object storage
/// or inlined as base64.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_base64_encoded: Option<String>,

    pub mime_type: String,
}

/// Audio pipeline options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AudioOptions {
    /// Whether to generate a square podcast thumbnail
    #[serde(default)]
    pub generate_thumbnail: bool,

    /// Custom prompt for the thumbnail; auto-derived from the main prompt
    /// when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_prompt: Option<String>,

    /// Which script-generation provider to use
    #[serde(default)]
    pub script_provider: ScriptProvider,

    /// Target container format for the delivered audio
    #[serde(default)]
    pub output_format: AudioFormat,

    /// Requested spoken duration budget in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_duration_seconds: Option<u32>,
}

/// Closed set of script-generation providers. Unknown names are rejected at
/// the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptProvider {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ScriptProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptProvider::Gemini => "gemini",
            ScriptProvider::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ScriptProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptProvider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" => Ok(ScriptProvider::Gemini),
            "openai" => Ok(ScriptProvider::OpenAi),
            other => Err(ValidationError::new(format!(
                "Unknown script provider '{}'. Supported providers: gemini, openai",
                other
            ))),
        }
    }
}

/// Audio container formats the gateway can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// Canonical intermediate format; synthesis always produces this first
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Ogg => "audio/ogg",
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, AudioFormat::Mp3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_request(params: VideoParameters) -> CreateJobRequest {
        CreateJobRequest {
            mode: JobKind::Video,
            prompt: "a cat on a skateboard".into(),
            parameters: Some(params),
            audio: None,
            credentials: None,
        }
    }

    #[test]
    fn duration_out_of_range_rejected() {
        let req = video_request(VideoParameters {
            duration_seconds: 90,
            ..Default::default()
        });
        let err = req.validate().unwrap_err();
        assert!(err.0.contains("between 1 and 60"));
    }

    #[test]
    fn unknown_model_rejected_with_supported_list() {
        let req = video_request(VideoParameters {
            model: "sora-1.0".into(),
            ..Default::default()
        });
        let err = req.validate().unwrap_err();
        assert!(err.0.contains("sora-1.0"));
        assert!(err.0.contains("veo-3.0-generate-preview"));
    }

    #[test]
    fn unsupported_aspect_ratio_rejected() {
        let req = video_request(VideoParameters {
            aspect_ratio: "21:9".into(),
            ..Default::default()
        });
        assert!(req.validate().is_err());
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(video_request(VideoParameters::default()).validate().is_ok());
    }

    #[test]
    fn empty_prompt_rejected() {
        let req = CreateJobRequest {
            mode: JobKind::Audio,
            prompt: "   ".into(),
            parameters: None,
            audio: None,
            credentials: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn total_steps_per_kind() {
        let mut req = CreateJobRequest {
            mode: JobKind::Audio,
            prompt: "a short note about rain".into(),
            parameters: None,
            audio: None,
            credentials: None,
        };
        assert_eq!(req.total_steps(), 4);

        req.audio = Some(AudioOptions {
            generate_thumbnail: true,
            ..Default::default()
        });
        assert_eq!(req.total_steps(), 5);

        req.mode = JobKind::Video;
        assert_eq!(req.total_steps(), 3);
    }

    #[test]
    fn unknown_script_provider_rejected() {
        let err = "anthropic".parse::<ScriptProvider>().unwrap_err();
        assert!(err.0.contains("anthropic"));
        assert_eq!("openai".parse::<ScriptProvider>().unwrap(), ScriptProvider::OpenAi);
    }

    #[test]
    fn camel_case_wire_format() {
        let json = r#"{"durationSeconds":8,"aspectRatio":"16:9"}"#;
        let params: VideoParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.duration_seconds, 8);
        assert!(params.generate_audio);
        assert_eq!(params.sample_count, 1);
    }
}
