//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ready once the content store answers.
pub async fn ready(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.repository.store_health().await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "Content store not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
