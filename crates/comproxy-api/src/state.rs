//! Application state shared across handlers.

use comproxy_proxy::Repository;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository>,
    /// Deadline for serving one client request, sub-requests included.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(repository: Arc<Repository>, request_timeout: Duration) -> Self {
        Self {
            repository,
            request_timeout,
        }
    }
}
