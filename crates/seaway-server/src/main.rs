//! Seaway Server - marine route planning over HTTP

use anyhow::Result;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seaway_server::api;
use seaway_server::config::Config;
use seaway_server::state::AppState;
use seaway_server::worker::WorkerBoundary;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seaway_server=debug".parse()?),
        )
        .init();

    tracing::info!("Starting Seaway Server...");

    let config = Config::from_env();
    let port = config.server_port;
    tracing::info!("Water source: {:?}", config.water_source);

    let factory_config = config.clone();
    let boundary = WorkerBoundary::new(config.worker_config(), move || {
        factory_config.build_classifier()
    });
    if let Err(err) = boundary.initialize().await {
        // Keep serving; routes come back as degraded direct lines.
        tracing::warn!("Worker not ready: {}", err);
    }

    let state = Arc::new(AppState::new(boundary.clone(), config));

    let app = api::routes()
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    boundary.shutdown().await;
    tracing::info!("Seaway Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
