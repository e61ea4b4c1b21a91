//! Progress events via Redis Pub/Sub.
//!
//! Workers publish `JobEvent`s on a per-job channel; the API layer either
//! subscribes to one job or pattern-subscribes to all of them for the
//! fan-out bridge.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

use genmedia_models::{JobEvent, JobId};

use crate::error::QueueResult;

/// Channel for publishing/subscribing to job events.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
    prefix: String,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        Self::with_prefix(redis_url, "genmedia:events")
    }

    /// Create with a custom channel prefix.
    pub fn with_prefix(redis_url: &str, prefix: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }

    /// Get the channel name for a job.
    pub fn channel_name(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.prefix, job_id)
    }

    /// Publish a job event.
    pub async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = self.channel_name(event.job_id());
        let payload = serde_json::to_string(event)?;

        debug!("Publishing {} to {}", event.event_type().as_str(), channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a progress update.
    pub async fn progress(
        &self,
        job_id: &JobId,
        value: u8,
        message: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(&JobEvent::progress(job_id.clone(), value, message))
            .await
    }

    /// Publish a completion event.
    pub async fn complete(&self, job_id: &JobId, result: Value) -> QueueResult<()> {
        self.publish(&JobEvent::complete(job_id.clone(), result))
            .await
    }

    /// Publish an error event.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&JobEvent::error(job_id.clone(), message))
            .await
    }

    /// Subscribe to events for one job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = self.channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    /// Subscribe to events for every job via a pattern subscription.
    pub async fn subscribe_all(
        &self,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let pattern = format!("{}:*", self.prefix);

        pubsub.psubscribe(&pattern).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
