//! HTTP upstream client.

use async_trait::async_trait;
use comproxy_core::{CacheInfo, Content, Error, Result, Upstream, UpstreamResponse};
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::UpstreamConfig;

/// [`Upstream`] backed by a reqwest client.
///
/// Relative URLs resolve against the configured repository base; absolute
/// URLs (distribution archives hosted elsewhere) are fetched as given.
pub struct HttpUpstream {
    client: Client,
    base_url: Url,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path or absolute URL to the URL actually fetched.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        self.base_url
            .join(url.trim_start_matches('/'))
            .map_err(|e| Error::Upstream {
                url: url.to_string(),
                status: None,
                message: format!("invalid url: {}", e),
            })
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn transport_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("upstream request to {}", url))
    } else {
        Error::Upstream {
            url: url.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &str, validators: Option<&CacheInfo>) -> Result<UpstreamResponse> {
        let target = self.resolve(url)?;
        let mut request = self.client.get(target.clone());

        if let Some(info) = validators {
            if let Some(etag) = &info.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &info.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        debug!(url = %target, conditional = validators.is_some(), "Fetching from upstream");
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&target, e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!(url = %target, "Upstream reports not modified");
                Ok(UpstreamResponse::NotModified)
            }
            status if status.is_success() => {
                let etag = header_string(&response, ETAG);
                let last_modified = header_string(&response, LAST_MODIFIED);
                let content_type = header_string(&response, CONTENT_TYPE)
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let payload = response
                    .bytes()
                    .await
                    .map_err(|e| transport_error(&target, e))?;

                info!(url = %target, size = payload.len(), "Fetched from upstream");
                Ok(UpstreamResponse::Fetched(Content::new(
                    payload,
                    content_type,
                    CacheInfo::fetched_now().with_validators(etag, last_modified),
                )))
            }
            status => {
                warn!(url = %target, status = status.as_u16(), "Upstream returned an error status");
                Err(Error::upstream_status(target.as_str(), status.as_u16()))
            }
        }
    }
}
