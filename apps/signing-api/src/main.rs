//! Signing API Server - REST controller for field layout and embedding
//!
//! Provides REST endpoints for:
//! - Document registration and metadata
//! - Field layout editing and burn-in
//! - Token-guarded signing for PDF and markup documents
//! - Artifact delivery

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod error;
mod handlers;
mod models;
mod state;
mod storage;
mod workflow;

use state::AppState;

/// Build the HTTP surface over the given state. Split from `main` so
/// tests can drive the router without binding a socket.
fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Document lifecycle
        .route("/api/documents", post(handlers::create_document))
        .route("/api/documents/:id", get(handlers::get_document))
        // Layout editing and burn-in
        .route("/api/documents/:id/layout", put(handlers::update_layout))
        .route("/api/documents/:id/layout/apply", post(handlers::apply_layout))
        // Signing
        .route("/api/documents/:id/sign", post(handlers::sign_document))
        // Artifact delivery
        .route("/api/artifacts/*path", get(handlers::get_artifact))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signing_api=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Initialize application state
    info!("Initializing Signing API...");
    let state = AppState::new().await?;
    let app = router(Arc::new(state));

    // Parse bind address
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3002);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting Signing API on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
