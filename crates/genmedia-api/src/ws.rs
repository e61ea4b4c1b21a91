//! WebSocket status streaming.
//!
//! Each connection watches one job. The socket first receives the job's
//! current resolved status, then live events relayed by the bridge, plus a
//! periodic ping so idle connections stay open through proxies.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use genmedia_models::JobId;

use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SEND_BUFFER: usize = 32;

/// Upgrade handler for `GET /ws/jobs/{job_id}`.
pub async fn job_events(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, job_id, state))
}

async fn handle_socket(socket: WebSocket, job_id: String, state: AppState) {
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(SEND_BUFFER);

    state.sockets.register(&job_id, tx.clone()).await;
    debug!(job_id, "WebSocket connected");

    // Replay the current status so late subscribers start consistent.
    match state.resolver.resolve(&JobId::from_string(job_id.clone())).await {
        Ok(status) => match serde_json::to_string(&status) {
            Ok(payload) => {
                let _ = tx.send(Message::Text(payload)).await;
            }
            Err(e) => warn!(job_id, "Failed to serialize initial status: {}", e),
        },
        Err(e) => warn!(job_id, "Failed to resolve initial status: {}", e),
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(job_id, "WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    drop(tx);
    state.sockets.prune(&job_id).await;
    debug!(job_id, "WebSocket disconnected");
}
