//! Cache statistics.

use axum::{Json, extract::State, http::StatusCode};
use comproxy_core::StoreStats;
use comproxy_proxy::MetricsSnapshot;
use serde::Serialize;
use std::sync::Arc;

use crate::error::error_response;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StatsResponse {
    pub proxy: MetricsSnapshot,
    pub store: StoreStats,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, (StatusCode, String)> {
    let store = state
        .repository
        .store_stats()
        .await
        .map_err(|e| error_response("/stats", e))?;

    Ok(Json(StatsResponse {
        proxy: state.repository.metrics(),
        store,
    }))
}
