//! Shared application state.

use std::sync::Arc;

use genmedia_queue::{JobQueue, ProgressChannel};

use crate::config::ApiConfig;
use crate::mcp::McpSession;
use crate::registry::{JobSocketRegistry, StreamRegistry};
use crate::services::{OperationPoller, StatusResolver};

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
    pub progress: Arc<ProgressChannel>,
    pub resolver: Arc<StatusResolver>,
    pub sockets: Arc<JobSocketRegistry>,
    pub streams: Arc<StreamRegistry>,
    pub mcp: Arc<McpSession>,
}

impl AppState {
    pub fn new(config: ApiConfig, queue: JobQueue, progress: ProgressChannel) -> Self {
        let queue = Arc::new(queue);
        let resolver = Arc::new(StatusResolver::new(
            Arc::clone(&queue),
            OperationPoller::from_env(),
        ));

        Self {
            config,
            queue,
            progress: Arc::new(progress),
            resolver,
            sockets: JobSocketRegistry::new(),
            streams: StreamRegistry::new(),
            mcp: Arc::new(McpSession::new()),
        }
    }
}
