//! HTTP API.
//!
//! Thin axum layer over [`Ingestor`]: request parsing, status codes and
//! response shapes live here, all behavior lives in the pipeline.

mod error;
mod handlers;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::Ingestor;

pub use error::ApiError;

/// Build the API router
pub fn router(ingestor: Ingestor) -> Router {
    let config = &ingestor.context().config;
    let cors = build_cors_layer(&config.server.cors_origins);
    let body_limit = config
        .limits
        .max_audio_bytes
        .max(config.limits.max_text_bytes) as usize;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/embed", post(handlers::embed))
        .route("/similarity", post(handlers::similarity))
        .route("/stt", post(handlers::stt))
        .route("/tts", post(handlers::tts))
        .route("/process", post(handlers::process))
        .route("/pdf", post(handlers::pdf))
        .route("/search", post(handlers::search))
        .route("/patterns", get(handlers::patterns))
        .route("/queue/process", post(handlers::process_queue))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ingestor)
}

/// CORS from configured origins; no origins means any origin
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    info!("CORS configured with {} origins", parsed.len());
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(methods)
        .allow_headers(Any)
}

/// Bind and serve until the process is stopped
pub async fn serve(ingestor: Ingestor, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(address = %bind, "Ingestion API listening");

    axum::serve(listener, router(ingestor))
        .await
        .context("HTTP server failed")
}
