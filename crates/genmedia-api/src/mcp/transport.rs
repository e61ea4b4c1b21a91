//! Legacy two-endpoint transport: an SSE channel per client plus a message
//! POST endpoint. Responses travel over the SSE channel, never the POST
//! response, which only acknowledges receipt.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::future::ready;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::mcp::endpoints;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use crate::registry::{StreamPayload, StreamRegistry};
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_BUFFER: usize = 64;

/// `GET /mcp/sse`: open the per-client event channel. The first event names
/// the client id to use on the message endpoint.
pub async fn sse_connect(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
    state.streams.register_client(&client_id, tx).await;
    info!(client_id, "SSE client connected");

    let hello = Event::default()
        .event("connected")
        .data(json!({ "client_id": client_id }).to_string());

    let events = ClientEvents {
        rx,
        registry: Arc::clone(&state.streams),
        client_id,
    };

    let stream = futures_util::stream::once(ready(Ok(hello))).chain(
        events.map(|payload| Ok(Event::default().event(payload.event).data(payload.data))),
    );

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// Receiver wrapper that deregisters its client when the connection drops.
struct ClientEvents {
    rx: mpsc::Receiver<StreamPayload>,
    registry: Arc<StreamRegistry>,
    client_id: String,
}

impl Stream for ClientEvents {
    type Item = StreamPayload;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ClientEvents {
    fn drop(&mut self) {
        let registry = Arc::clone(&self.registry);
        let client_id = std::mem::take(&mut self.client_id);
        tokio::spawn(async move {
            registry.deregister_client(&client_id).await;
            info!(client_id, "SSE client disconnected");
        });
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub client_id: String,
}

/// `POST /mcp/messages?client_id=`: accept one JSON-RPC message. The
/// response, if any, is delivered on the client's SSE channel; the HTTP
/// answer is always 202.
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(e) => {
            let response =
                JsonRpcResponse::error(None, PARSE_ERROR, format!("Invalid message: {}", e));
            deliver(&state, &query.client_id, &response).await?;
            return Ok(StatusCode::ACCEPTED);
        }
    };

    let outcome = endpoints::handle_request(&state, request).await;

    if let Some(job_id) = &outcome.streaming_job {
        state
            .streams
            .watch_job(&query.client_id, job_id.as_str())
            .await;
    }
    if let Some(response) = outcome.response {
        deliver(&state, &query.client_id, &response).await?;
    }

    Ok(StatusCode::ACCEPTED)
}

async fn deliver(state: &AppState, client_id: &str, response: &JsonRpcResponse) -> ApiResult<()> {
    let data = serde_json::to_string(response)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))?;

    let delivered = state
        .streams
        .send_to(
            client_id,
            StreamPayload {
                event: "message".to_string(),
                data,
            },
        )
        .await;

    if delivered {
        Ok(())
    } else {
        Err(ApiError::not_found(format!(
            "Unknown SSE client: {}",
            client_id
        )))
    }
}
