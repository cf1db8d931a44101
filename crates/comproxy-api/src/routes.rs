//! Route definitions.

use axum::{Router, middleware::from_fn, routing::get};
use std::sync::Arc;

use crate::handlers::{assets, health, stats};
use crate::middleware::{compression_layer, request_id, trace_layer};
use crate::state::AppState;

/// Create the main router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/stats", get(stats::stats))
        .route("/{*path}", get(assets::serve_asset))
        .layer(compression_layer())
        .layer(trace_layer())
        .layer(from_fn(request_id))
        .with_state(state)
}
