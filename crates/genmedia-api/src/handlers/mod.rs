//! HTTP request handlers.

pub mod jobs;

use axum::Json;
use serde_json::{json, Value};

/// Health check endpoint.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "genmedia-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
