//! Composer repository paths.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use comproxy_core::{Dispatch, DispatchAttributes, Error};
use std::sync::Arc;

use crate::error::error_response;
use crate::state::AppState;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Serve one asset, bounded by the request deadline.
///
/// Hitting the deadline drops the dispatch future, which cancels any
/// upstream fetch no other request is waiting on.
pub async fn serve_asset(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let dispatch = state.repository.dispatch(&path, DispatchAttributes::client());
    let response = match tokio::time::timeout(state.request_timeout, dispatch).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "no response for {} within {}s",
            path,
            state.request_timeout.as_secs()
        ))),
    }
    .map_err(|e| error_response(&path, e))?;

    let content_type = HeaderValue::from_str(&response.content.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut reply = Body::from(response.content.payload).into_response();
    let headers = reply.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(X_CACHE, HeaderValue::from_static(response.cache_status.as_str()));
    Ok(reply)
}
