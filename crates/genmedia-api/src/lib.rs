//! HTTP, WebSocket and MCP gateway for generation jobs.

pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mcp;
pub mod registry;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use bridge::EventBridge;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
