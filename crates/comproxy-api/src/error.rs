//! Mapping of proxy errors onto HTTP responses.

use axum::http::StatusCode;
use comproxy_core::Error;
use tracing::{error, warn};

/// Status code a client sees for an error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Upstream { .. } if err.is_upstream_not_found() => StatusCode::NOT_FOUND,
        Error::Upstream { .. } | Error::MalformedContent(_) => StatusCode::BAD_GATEWAY,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::NotFoundInMetadata { .. } | Error::NoRoute(_) => StatusCode::NOT_FOUND,
        Error::ContractViolation(_) | Error::Storage(_) | Error::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Log an error and turn it into a handler rejection.
pub fn error_response(path: &str, err: Error) -> (StatusCode, String) {
    let status = status_for(&err);
    if status.is_server_error() {
        if matches!(err, Error::ContractViolation(_)) {
            error!(path, error = %err, "Request aborted");
        } else {
            warn!(path, error = %err, status = status.as_u16(), "Request failed");
        }
    }
    (status, err.to_string())
}
