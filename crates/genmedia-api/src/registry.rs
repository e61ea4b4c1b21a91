//! Connection registries for WebSocket and SSE fan-out.
//!
//! Both registries are owned by `AppState` and injected where needed, so
//! tests can construct them in isolation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// WebSocket connections, keyed by job id. A job may have several watchers.
#[derive(Default)]
pub struct JobSocketRegistry {
    connections: RwLock<HashMap<String, Vec<mpsc::Sender<Message>>>>,
}

impl JobSocketRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, job_id: &str, tx: mpsc::Sender<Message>) {
        let mut map = self.connections.write().await;
        map.entry(job_id.to_string()).or_default().push(tx);
        debug!(job_id, "Registered WebSocket watcher");
    }

    /// Send `payload` to every watcher of `job_id`, pruning any whose
    /// channel has closed.
    pub async fn broadcast(&self, job_id: &str, payload: &str) {
        let mut map = self.connections.write().await;
        if let Some(senders) = map.get_mut(job_id) {
            senders.retain(|tx| tx.try_send(Message::Text(payload.to_string())).is_ok());
            if senders.is_empty() {
                map.remove(job_id);
            }
        }
    }

    /// Drop watchers whose channels are gone for this job.
    pub async fn prune(&self, job_id: &str) {
        let mut map = self.connections.write().await;
        if let Some(senders) = map.get_mut(job_id) {
            senders.retain(|tx| !tx.is_closed());
            if senders.is_empty() {
                map.remove(job_id);
            }
        }
    }

    pub async fn watcher_count(&self, job_id: &str) -> usize {
        self.connections
            .read()
            .await
            .get(job_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// SSE clients for the two-endpoint protocol transport, keyed by client id,
/// with a mapping from job id to the clients watching it.
#[derive(Default)]
pub struct StreamRegistry {
    clients: RwLock<HashMap<String, mpsc::Sender<StreamPayload>>>,
    job_watchers: RwLock<HashMap<String, HashSet<String>>>,
}

/// A named SSE event destined for one client.
#[derive(Debug, Clone)]
pub struct StreamPayload {
    pub event: String,
    pub data: String,
}

impl StreamRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register_client(&self, client_id: &str, tx: mpsc::Sender<StreamPayload>) {
        self.clients.write().await.insert(client_id.to_string(), tx);
        debug!(client_id, "Registered SSE client");
    }

    pub async fn deregister_client(&self, client_id: &str) {
        self.clients.write().await.remove(client_id);
        let mut watchers = self.job_watchers.write().await;
        for set in watchers.values_mut() {
            set.remove(client_id);
        }
        watchers.retain(|_, set| !set.is_empty());
        debug!(client_id, "Deregistered SSE client");
    }

    /// Record that `client_id` wants events for `job_id`.
    pub async fn watch_job(&self, client_id: &str, job_id: &str) {
        self.job_watchers
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Send an event to one client. Returns false when the client is gone.
    pub async fn send_to(&self, client_id: &str, payload: StreamPayload) -> bool {
        let clients = self.clients.read().await;
        match clients.get(client_id) {
            Some(tx) => tx.send(payload).await.is_ok(),
            None => false,
        }
    }

    /// Fan an event out to every client watching `job_id`.
    pub async fn broadcast_job_event(&self, job_id: &str, payload: StreamPayload) {
        let watcher_ids: Vec<String> = {
            let watchers = self.job_watchers.read().await;
            match watchers.get(job_id) {
                Some(set) => set.iter().cloned().collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for client_id in watcher_ids {
            if !self.send_to(&client_id, payload.clone()).await {
                dead.push(client_id);
            }
        }
        for client_id in dead {
            self.deregister_client(&client_id).await;
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn socket_broadcast_prunes_closed_channels() {
        let registry = JobSocketRegistry::new();
        let (alive_tx, mut alive_rx) = mpsc::channel(4);
        let (dead_tx, dead_rx) = mpsc::channel(4);
        drop(dead_rx);

        registry.register("job-1", alive_tx).await;
        registry.register("job-1", dead_tx).await;
        assert_eq!(registry.watcher_count("job-1").await, 2);

        registry.broadcast("job-1", "{\"progress\":50}").await;
        assert_eq!(registry.watcher_count("job-1").await, 1);
        assert!(matches!(alive_rx.recv().await, Some(Message::Text(t)) if t.contains("50")));
    }

    #[tokio::test]
    async fn stream_events_reach_only_watching_clients() {
        let registry = StreamRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);

        registry.register_client("a", tx_a).await;
        registry.register_client("b", tx_b).await;
        registry.watch_job("a", "job-1").await;

        registry
            .broadcast_job_event(
                "job-1",
                StreamPayload {
                    event: "job_progress".into(),
                    data: "{}".into(),
                },
            )
            .await;

        assert_eq!(rx_a.recv().await.unwrap().event, "job_progress");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn deregister_removes_job_watch() {
        let registry = StreamRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.register_client("a", tx).await;
        registry.watch_job("a", "job-1").await;
        registry.deregister_client("a").await;
        assert_eq!(registry.client_count().await, 0);
    }
}
