//! Bridge from the Redis event channel to connected clients.
//!
//! One background task pattern-subscribes to every job channel and fans each
//! event out to the WebSocket and SSE registries. Connections never touch
//! Redis directly.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use genmedia_queue::ProgressChannel;

use crate::registry::{JobSocketRegistry, StreamPayload, StreamRegistry};

const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(5);

/// Handle to the running fan-out task.
pub struct EventBridge {
    shutdown: watch::Sender<bool>,
}

impl EventBridge {
    /// Spawn the bridge task. It resubscribes with backoff if the Redis
    /// connection drops.
    pub fn spawn(
        progress: Arc<ProgressChannel>,
        sockets: Arc<JobSocketRegistry>,
        streams: Arc<StreamRegistry>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let mut events = match progress.subscribe_all().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Event bridge subscription failed: {}", e);
                        tokio::select! {
                            _ = shutdown_rx.changed() => break,
                            _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => continue,
                        }
                    }
                };
                info!("Event bridge subscribed to job events");

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => return,
                        event = events.next() => {
                            let Some(event) = event else { break };

                            let job_id = event.job_id().to_string();
                            let payload = match serde_json::to_string(&event) {
                                Ok(json) => json,
                                Err(e) => {
                                    warn!(job_id, "Failed to serialize event: {}", e);
                                    continue;
                                }
                            };

                            sockets.broadcast(&job_id, &payload).await;
                            streams
                                .broadcast_job_event(
                                    &job_id,
                                    StreamPayload {
                                        event: event.event_type().as_str().to_string(),
                                        data: payload,
                                    },
                                )
                                .await;
                        }
                    }
                }
                warn!("Event bridge stream ended, resubscribing");
            }
            info!("Event bridge stopped");
        });

        Self {
            shutdown: shutdown_tx,
        }
    }

    /// Stop the bridge task.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
