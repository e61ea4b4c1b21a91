//! Route table and middleware stack.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers;
use crate::mcp;
use crate::state::AppState;
use crate::ws;

/// Build the application router.
///
/// Long-poll, WebSocket and SSE routes sit outside the request timeout;
/// holding the connection open is their job.
pub fn create_router(state: AppState) -> Router {
    let timed = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/jobs", post(handlers::jobs::create_job))
        .route("/api/jobs/:job_id", get(handlers::jobs::job_status))
        .route("/api/operations/status", get(handlers::jobs::operation_status))
        .layer(TimeoutLayer::new(state.config.request_timeout));

    let streaming = Router::new()
        .route("/api/jobs/:job_id/wait", get(handlers::jobs::wait_job_status))
        .route("/ws/jobs/:job_id", get(ws::job_events))
        .route("/mcp", post(mcp::streamable::handle))
        .route("/mcp/sse", get(mcp::transport::sse_connect))
        .route("/mcp/messages", post(mcp::transport::post_message));

    Router::new()
        .merge(timed)
        .merge(streaming)
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}
