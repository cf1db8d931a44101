//! Error types for comproxy.

use thiserror::Error;

/// Errors raised while routing, resolving, fetching or storing an asset.
///
/// The type is `Clone` because a single deduplicated upstream fetch hands
/// its outcome to every request that joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    // Upstream errors
    #[error("Upstream request to {url} failed: {message}")]
    Upstream {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    // Metadata errors
    #[error("Version {version} of {package} not found in provider metadata")]
    NotFoundInMetadata { package: String, version: String },

    #[error("Malformed upstream content: {0}")]
    MalformedContent(String),

    // Routing errors
    #[error("No route for path: {0}")]
    NoRoute(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    // Infrastructure errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build an upstream error for a response that came back with a non-success status.
    pub fn upstream_status(url: impl Into<String>, status: u16) -> Self {
        Error::Upstream {
            url: url.into(),
            status: Some(status),
            message: format!("upstream returned status {}", status),
        }
    }

    /// Whether this failure came from the transport rather than from the payload.
    ///
    /// Only these failures may fall back to a stale cached copy.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Upstream { .. } | Error::Timeout(_))
    }

    /// Whether the upstream reported that the resource does not exist.
    pub fn is_upstream_not_found(&self) -> bool {
        matches!(self, Error::Upstream { status: Some(404), .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedContent(err.to_string())
    }
}
