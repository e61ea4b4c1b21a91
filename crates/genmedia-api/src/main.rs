//! API gateway binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use genmedia_api::{create_router, ApiConfig, AppState, EventBridge};
use genmedia_queue::{JobQueue, ProgressChannel, QueueConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("genmedia=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting genmedia-api");

    let config = ApiConfig::from_env();
    info!("Environment: {}", config.environment);

    let queue_config = QueueConfig::from_env();
    let queue = match JobQueue::new(queue_config.clone()) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = queue.init().await {
        error!("Failed to initialize job queue: {}", e);
        std::process::exit(1);
    }

    let progress = match ProgressChannel::new(&queue_config.redis_url) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create progress channel: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(config.clone(), queue, progress);

    let bridge = EventBridge::spawn(
        Arc::clone(&state.progress),
        Arc::clone(&state.sockets),
        Arc::clone(&state.streams),
    );

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    });

    if let Err(e) = serve.await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    bridge.shutdown();
    info!("API shutdown complete");
}
