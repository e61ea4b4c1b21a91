//! Streamable single-endpoint transport.
//!
//! `POST /mcp` answers each message inline. When a generation tool is called
//! by a client that accepts `text/event-stream`, the body is an SSE stream:
//! the JSON-RPC result first, then the job's progress events through its
//! terminal event.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::future::ready;
use futures_util::{stream, StreamExt};

use genmedia_models::JobId;

use crate::error::ApiError;
use crate::mcp::endpoints;
use crate::mcp::protocol::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PROTOCOL_VERSION, PARSE_ERROR,
};
use crate::state::AppState;

/// Revisions acceptable in the `MCP-Protocol-Version` header. Older clients
/// omit the header entirely.
const HEADER_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2025-06-18"];

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// `POST /mcp`: dispatch one JSON-RPC message.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(version) = headers
        .get("mcp-protocol-version")
        .and_then(|v| v.to_str().ok())
    {
        if !HEADER_PROTOCOL_VERSIONS.contains(&version) {
            let response = JsonRpcResponse::error(
                None,
                INVALID_PROTOCOL_VERSION,
                format!("Unsupported protocol version: {}", version),
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    }

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            let response =
                JsonRpcResponse::error(None, PARSE_ERROR, format!("Invalid message: {}", e));
            return Json(response).into_response();
        }
    };

    let accepts_sse = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false);

    let outcome = endpoints::handle_request(&state, request).await;

    let Some(response) = outcome.response else {
        // Notifications are acknowledged with an empty 202.
        return StatusCode::ACCEPTED.into_response();
    };

    match outcome.streaming_job {
        Some(job_id) if accepts_sse => match stream_response(&state, response, job_id).await {
            Ok(sse) => sse,
            Err(e) => e.into_response(),
        },
        _ => Json(response).into_response(),
    }
}

/// The result as the first SSE event, then the job's events until the
/// terminal one.
async fn stream_response(
    state: &AppState,
    response: JsonRpcResponse,
    job_id: JobId,
) -> Result<Response, ApiError> {
    let events = state.progress.subscribe(&job_id).await?;

    let initial = serde_json::to_string(&response)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))?;
    let head = stream::once(ready(Ok::<Event, Infallible>(
        Event::default().event("message").data(initial),
    )));

    let tail = events
        .scan(false, |done, event| {
            if *done {
                return ready(None);
            }
            *done = event.is_terminal();
            ready(Some(event))
        })
        .filter_map(|event| {
            ready(
                serde_json::to_string(&event)
                    .ok()
                    .map(|data| Ok(Event::default().event(event.event_type().as_str()).data(data))),
            )
        });

    Ok(Sse::new(head.chain(tail))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response())
}
