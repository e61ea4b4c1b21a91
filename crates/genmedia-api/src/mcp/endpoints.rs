//! JSON-RPC method dispatch: tools, prompts and resources.

use serde_json::{json, Value};
use tracing::{info, warn};

use genmedia_models::{
    AudioOptions, CreateJobRequest, CreateJobResponse, JobId, JobKind, JobState,
    ScriptProvider, VideoParameters,
};
use genmedia_queue::QueuedJob;
use genmedia_vendors::ScriptClient;

use crate::mcp::protocol::{
    JsonRpcRequest, JsonRpcResponse, McpSession, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_PROTOCOL_VERSION, INVALID_REQUEST, METHOD_NOT_FOUND, RESOURCE_NOT_FOUND,
    TOOL_EXECUTION_ERROR,
};
use crate::state::AppState;

/// Result of dispatching one message.
pub struct RpcOutcome {
    /// Response to deliver, absent for notifications
    pub response: Option<JsonRpcResponse>,
    /// Job submitted by a generation tool, for transports that stream
    /// progress after the result
    pub streaming_job: Option<JobId>,
}

impl RpcOutcome {
    fn respond(response: JsonRpcResponse) -> Self {
        Self {
            response: Some(response),
            streaming_job: None,
        }
    }

    fn silent() -> Self {
        Self {
            response: None,
            streaming_job: None,
        }
    }
}

/// Dispatch one JSON-RPC message against the shared session.
pub async fn handle_request(state: &AppState, req: JsonRpcRequest) -> RpcOutcome {
    let is_notification = req.is_notification();

    let outcome = dispatch(state, req).await;

    // Notifications never receive a response, success or failure.
    if is_notification {
        return RpcOutcome {
            response: None,
            streaming_job: outcome.streaming_job,
        };
    }
    outcome
}

async fn dispatch(state: &AppState, req: JsonRpcRequest) -> RpcOutcome {
    if req.jsonrpc != "2.0" {
        return RpcOutcome::respond(JsonRpcResponse::error(
            req.id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    let session = &state.mcp;
    if !session.is_initialized() && !McpSession::exempt_from_init(&req.method) {
        return RpcOutcome::respond(JsonRpcResponse::error(
            req.id,
            INVALID_REQUEST,
            "Server not initialized: call initialize first",
        ));
    }

    match req.method.as_str() {
        "initialize" => {
            let Some(requested) = req.params.get("protocolVersion").and_then(Value::as_str)
            else {
                return RpcOutcome::respond(JsonRpcResponse::error(
                    req.id,
                    INVALID_PARAMS,
                    "Invalid initialize parameters: missing protocolVersion",
                ));
            };
            match session.negotiate(requested) {
                Ok(version) => {
                    session.mark_initialized();
                    info!(version, "Protocol session initialized");
                    RpcOutcome::respond(JsonRpcResponse::success(
                        req.id,
                        json!({
                            "protocolVersion": version,
                            "capabilities": {
                                "tools": { "listChanged": false },
                                "prompts": { "listChanged": false },
                                "resources": { "subscribe": false, "listChanged": false },
                            },
                            "serverInfo": {
                                "name": "genmedia",
                                "version": env!("CARGO_PKG_VERSION"),
                            },
                        }),
                    ))
                }
                Err(message) => RpcOutcome::respond(JsonRpcResponse::error(
                    req.id,
                    INVALID_PROTOCOL_VERSION,
                    message,
                )),
            }
        }

        // One-way acknowledgment; initialization already happened in the
        // initialize call.
        "notifications/initialized" => RpcOutcome::silent(),

        "ping" => RpcOutcome::respond(JsonRpcResponse::success(req.id, json!({}))),

        "tools/list" => {
            RpcOutcome::respond(JsonRpcResponse::success(req.id, tool_listing()))
        }

        "tools/call" => {
            let name = req
                .params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = req
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));

            match call_tool(state, &name, arguments).await {
                Ok((result, streaming_job)) => RpcOutcome {
                    response: Some(JsonRpcResponse::success(req.id, result)),
                    streaming_job,
                },
                Err((code, message)) => {
                    RpcOutcome::respond(JsonRpcResponse::error(req.id, code, message))
                }
            }
        }

        "prompts/list" => {
            RpcOutcome::respond(JsonRpcResponse::success(req.id, prompt_listing()))
        }

        "prompts/get" => {
            let name = req
                .params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = req
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            match render_prompt(name, &arguments) {
                Ok(result) => RpcOutcome::respond(JsonRpcResponse::success(req.id, result)),
                Err(message) => RpcOutcome::respond(JsonRpcResponse::error(
                    req.id,
                    INVALID_PARAMS,
                    message,
                )),
            }
        }

        "resources/list" => {
            RpcOutcome::respond(JsonRpcResponse::success(req.id, list_resources(state).await))
        }

        "resources/templates/list" => RpcOutcome::respond(JsonRpcResponse::success(
            req.id,
            json!({
                "resourceTemplates": [{
                    "uriTemplate": "job://{job_id}",
                    "name": "Job status",
                    "description": "Resolved status of a generation job",
                    "mimeType": "application/json",
                }],
            }),
        )),

        "resources/read" => {
            let uri = req
                .params
                .get("uri")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match read_resource(state, &uri).await {
                Ok(result) => RpcOutcome::respond(JsonRpcResponse::success(req.id, result)),
                Err((code, message)) => {
                    RpcOutcome::respond(JsonRpcResponse::error(req.id, code, message))
                }
            }
        }

        other => RpcOutcome::respond(JsonRpcResponse::error(
            req.id,
            METHOD_NOT_FOUND,
            format!("Unknown method: {}", other),
        )),
    }
}

fn tool_listing() -> Value {
    json!({
        "tools": [
            {
                "name": "generate_video",
                "description": "Generate a video from a text prompt. Returns a job id to watch for progress.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string", "description": "What the video should show" },
                        "parameters": {
                            "type": "object",
                            "description": "Video parameters: durationSeconds, aspectRatio, sampleCount, model, generateAudio",
                        },
                    },
                    "required": ["prompt"],
                },
            },
            {
                "name": "generate_audio",
                "description": "Generate narrated audio from a topic prompt. Returns a job id to watch for progress.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string", "description": "Topic of the narration" },
                        "audio": {
                            "type": "object",
                            "description": "Audio options: script_provider, output_format, target_duration_seconds, generate_thumbnail",
                        },
                    },
                    "required": ["prompt"],
                },
            },
            {
                "name": "check_job_status",
                "description": "Look up the current status of a generation job.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "job_id": { "type": "string" },
                    },
                    "required": ["job_id"],
                },
            },
            {
                "name": "analyze_writing_style",
                "description": "Analyze the writing style of a text sample.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Text sample to analyze" },
                    },
                    "required": ["text"],
                },
            },
        ],
    })
}

async fn call_tool(
    state: &AppState,
    name: &str,
    arguments: Value,
) -> Result<(Value, Option<JobId>), (i64, String)> {
    match name {
        "generate_video" => {
            let prompt = require_str(&arguments, "prompt")?;
            let parameters: Option<VideoParameters> = parse_field(&arguments, "parameters")?;
            let request = CreateJobRequest {
                mode: JobKind::Video,
                prompt,
                parameters,
                audio: None,
                credentials: None,
            };
            submit_tool_job(state, request).await
        }

        "generate_audio" => {
            let prompt = require_str(&arguments, "prompt")?;
            let audio: Option<AudioOptions> = parse_field(&arguments, "audio")?;
            let request = CreateJobRequest {
                mode: JobKind::Audio,
                prompt,
                parameters: None,
                audio,
                credentials: None,
            };
            submit_tool_job(state, request).await
        }

        "check_job_status" => {
            let job_id = require_str(&arguments, "job_id")?;
            let status = state
                .resolver
                .resolve(&JobId::from_string(job_id))
                .await
                .map_err(|e| (TOOL_EXECUTION_ERROR, e.to_string()))?;
            Ok((text_result(&status)?, None))
        }

        "analyze_writing_style" => {
            let text = require_str(&arguments, "text")?;
            let client = ScriptClient::new(
                std::env::var("GEMINI_API_KEY").ok(),
                std::env::var("OPENAI_API_KEY").ok(),
            );
            let instruction = format!(
                "Analyze the writing style of the following text. Describe its tone, \
                 vocabulary, sentence structure and pacing, then summarize how to \
                 imitate it.\n\nText:\n{}",
                text
            );
            let analysis = client
                .complete(ScriptProvider::Gemini, &instruction)
                .await
                .map_err(|e| (TOOL_EXECUTION_ERROR, e.to_string()))?;
            Ok((
                json!({
                    "content": [{ "type": "text", "text": analysis }],
                    "isError": false,
                }),
                None,
            ))
        }

        other => Err((INVALID_PARAMS, format!("Unknown tool: {}", other))),
    }
}

async fn submit_tool_job(
    state: &AppState,
    request: CreateJobRequest,
) -> Result<(Value, Option<JobId>), (i64, String)> {
    request
        .validate()
        .map_err(|e| (INVALID_PARAMS, e.to_string()))?;

    let job_id = JobId::new();
    let mode = request.mode;
    let total_steps = request.total_steps();
    let job = QueuedJob::new(job_id.clone(), request);
    state
        .queue
        .submit(&job)
        .await
        .map_err(|e| (TOOL_EXECUTION_ERROR, e.to_string()))?;

    info!(job_id = %job_id, %mode, "Submitted job via tool call");
    let response = CreateJobResponse::queued(job_id.clone(), mode, total_steps);
    Ok((text_result(&response)?, Some(job_id)))
}

fn text_result<T: serde::Serialize>(value: &T) -> Result<Value, (i64, String)> {
    let text = serde_json::to_string(value).map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
    Ok(json!({
        "content": [{ "type": "text", "text": text }],
        "isError": false,
    }))
}

fn require_str(arguments: &Value, key: &str) -> Result<String, (i64, String)> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| (INVALID_PARAMS, format!("Missing required argument: {}", key)))
}

fn parse_field<T: serde::de::DeserializeOwned>(
    arguments: &Value,
    key: &str,
) -> Result<Option<T>, (i64, String)> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid {}: {}", key, e))),
    }
}

fn prompt_listing() -> Value {
    json!({
        "prompts": [
            {
                "name": "video_generation",
                "description": "Craft a detailed video generation prompt from a topic",
                "arguments": [
                    { "name": "topic", "description": "Subject of the video", "required": true },
                    { "name": "style", "description": "Visual style to aim for", "required": false },
                ],
            },
            {
                "name": "podcast_generation",
                "description": "Craft a narration prompt for a short spoken piece",
                "arguments": [
                    { "name": "topic", "description": "Subject of the narration", "required": true },
                    { "name": "duration_seconds", "description": "Spoken length to target", "required": false },
                ],
            },
            {
                "name": "style_analysis",
                "description": "Ask for a writing-style breakdown of a text sample",
                "arguments": [
                    { "name": "text", "description": "Text sample to analyze", "required": true },
                ],
            },
        ],
    })
}

fn render_prompt(name: &str, arguments: &Value) -> Result<Value, String> {
    let get = |key: &str| arguments.get(key).and_then(Value::as_str);

    let text = match name {
        "video_generation" => {
            let topic = get("topic").ok_or("Missing required argument: topic")?;
            match get("style") {
                Some(style) => format!(
                    "Generate a short video of {}. Render it in a {} style, with \
                     smooth camera motion and natural lighting.",
                    topic, style
                ),
                None => format!(
                    "Generate a short video of {}, with smooth camera motion and \
                     natural lighting.",
                    topic
                ),
            }
        }
        "podcast_generation" => {
            let topic = get("topic").ok_or("Missing required argument: topic")?;
            match get("duration_seconds") {
                Some(secs) => format!(
                    "Narrate a spoken piece about {} lasting roughly {} seconds. \
                     Keep the tone conversational.",
                    topic, secs
                ),
                None => format!(
                    "Narrate a short spoken piece about {}. Keep the tone \
                     conversational.",
                    topic
                ),
            }
        }
        "style_analysis" => {
            let text = get("text").ok_or("Missing required argument: text")?;
            format!(
                "Analyze the writing style of the following text and explain how \
                 to imitate it:\n\n{}",
                text
            )
        }
        other => return Err(format!("Unknown prompt: {}", other)),
    };

    Ok(json!({
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text },
        }],
    }))
}

/// Cap on entries returned by `resources/list`.
const RESOURCE_LISTING_CAP: usize = 10;

/// Recent jobs as addressable resources. Listing is best effort: a queue
/// error yields an empty list, not a protocol failure.
async fn list_resources(state: &AppState) -> Value {
    let ids = match state.queue.recent_job_ids(RESOURCE_LISTING_CAP).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Failed to list recent jobs: {}", e);
            Vec::new()
        }
    };

    let resources: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "uri": format!("job://{}", id),
                "name": format!("Job {}", id),
                "description": "Resolved status of a generation job",
                "mimeType": "application/json",
            })
        })
        .collect();
    json!({ "resources": resources })
}

async fn read_resource(state: &AppState, uri: &str) -> Result<Value, (i64, String)> {
    let job_id = uri
        .strip_prefix("job://")
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| (INVALID_PARAMS, format!("Unsupported resource URI: {}", uri)))?;

    let status = state
        .resolver
        .resolve(&JobId::from_string(job_id))
        .await
        .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;

    if status.status == JobState::NotFound {
        return Err((RESOURCE_NOT_FOUND, format!("Unknown job: {}", job_id)));
    }

    let text = serde_json::to_string(&status).map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": text,
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use genmedia_queue::{JobQueue, ProgressChannel, QueueConfig};

    use crate::config::ApiConfig;

    fn test_state() -> AppState {
        let queue = JobQueue::new(QueueConfig::default()).unwrap();
        let progress = ProgressChannel::new("redis://localhost:6379").unwrap();
        AppState::new(ApiConfig::default(), queue, progress)
    }

    fn request(body: Value) -> JsonRpcRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn initialize_rejects_unsupported_version() {
        let state = test_state();
        let outcome = handle_request(
            &state,
            request(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": { "protocolVersion": "1999-01-01" },
            })),
        )
        .await;

        let response = outcome.response.unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PROTOCOL_VERSION);
        assert!(error.message.contains("1999-01-01"));
        assert!(error.message.contains("2025-06-18"));
        // A rejected handshake must not unlock the session.
        assert!(!state.mcp.is_initialized());
    }

    #[tokio::test]
    async fn initialize_requires_protocol_version() {
        let state = test_state();
        let outcome = handle_request(
            &state,
            request(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {},
            })),
        )
        .await;

        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn successful_initialize_unlocks_the_session() {
        let state = test_state();

        // The gate holds before the handshake.
        let outcome = handle_request(
            &state,
            request(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })),
        )
        .await;
        assert_eq!(
            outcome.response.unwrap().error.unwrap().code,
            INVALID_REQUEST
        );

        let outcome = handle_request(
            &state,
            request(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "initialize",
                "params": { "protocolVersion": "2025-06-18" },
            })),
        )
        .await;
        let response = outcome.response.unwrap();
        assert!(response.error.is_none());
        assert_eq!(
            response.result.unwrap()["protocolVersion"],
            "2025-06-18"
        );

        // No notifications/initialized needed: tools/list works right away.
        let outcome = handle_request(
            &state,
            request(json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" })),
        )
        .await;
        let response = outcome.response.unwrap();
        assert!(response.error.is_none());
        assert!(response.result.unwrap()["tools"].is_array());
    }

    #[tokio::test]
    async fn resources_list_degrades_to_empty_without_redis() {
        let queue = JobQueue::new(QueueConfig {
            redis_url: "redis://127.0.0.1:1".into(),
            ..QueueConfig::default()
        })
        .unwrap();
        let progress = ProgressChannel::new("redis://127.0.0.1:1").unwrap();
        let state = AppState::new(ApiConfig::default(), queue, progress);
        state.mcp.mark_initialized();

        let outcome = handle_request(
            &state,
            request(json!({ "jsonrpc": "2.0", "id": 1, "method": "resources/list" })),
        )
        .await;
        let response = outcome.response.unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["resources"], json!([]));
    }

    #[test]
    fn unknown_prompt_rejected() {
        assert!(render_prompt("missing", &json!({})).is_err());
    }

    #[test]
    fn video_prompt_renders_topic_and_style() {
        let result =
            render_prompt("video_generation", &json!({"topic": "a tide pool", "style": "macro"}))
                .unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("a tide pool"));
        assert!(text.contains("macro"));
    }

    #[test]
    fn prompt_missing_required_argument() {
        let err = render_prompt("podcast_generation", &json!({})).unwrap_err();
        assert!(err.contains("topic"));
    }

    #[test]
    fn require_str_rejects_blank() {
        assert!(require_str(&json!({"prompt": "  "}), "prompt").is_err());
        assert_eq!(
            require_str(&json!({"prompt": "ok"}), "prompt").unwrap(),
            "ok"
        );
    }

    #[test]
    fn parse_field_surfaces_shape_errors() {
        let err = parse_field::<VideoParameters>(&json!({"parameters": 42}), "parameters")
            .unwrap_err();
        assert_eq!(err.0, INVALID_PARAMS);

        let none = parse_field::<VideoParameters>(&json!({}), "parameters").unwrap();
        assert!(none.is_none());
    }
}
