//! HTTP surface. The main application router serves the
//! `/v1/*` + `/health` endpoints on `server.bind`; `/metrics` is served on
//! a separate listener bound to `server.metrics_bind` (`src/main.rs`
//! wires both up).

pub mod headers;
pub mod routes;
pub mod sse;

use crate::config::AppConfig;
use crate::kv::InMemoryKv;
use crate::models::ModelRegistry;
use crate::pipeline::Pipeline;
use crate::rate_limiter::RateLimiter;
use crate::tiers::TierRegistry;
use crate::token_counter::CachedTokenCounter;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub models: Arc<ModelRegistry>,
    pub token_counter: Arc<CachedTokenCounter<InMemoryKv>>,
    pub rate_limiter: Arc<RateLimiter<InMemoryKv>>,
    pub tiers: Arc<TierRegistry>,
    pub pipeline: Arc<Pipeline<InMemoryKv>>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/models", get(routes::list_models))
        .route("/v1/chat/completions", post(routes::chat_completions))
        .route("/v1/completions", post(routes::completions))
        .route("/v1/embeddings", post(routes::embeddings))
        .route("/v1/images/generations", post(routes::images_generations))
        .with_state(state)
}

/// A minimal router exposing only `/metrics`, bound to its own port
///. The actual exposition format is an
/// out-of-scope external collaborator; this just serves
/// whatever the `prometheus` default registry encodes today.
pub fn build_metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> impl axum::response::IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (axum::http::StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}
