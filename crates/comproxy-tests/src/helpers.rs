//! Test helper functions and utilities.

use comproxy_api::{AppState, create_router};
use comproxy_core::{CacheControllers, ContentStore};
use comproxy_proxy::{
    ComposerJsonCodec, HttpUpstream, ProxyFacet, ProxyFacetParts, Repository, UpstreamConfig,
};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// What a test server proxies and how it caches.
pub struct ServerOptions {
    pub upstream_url: String,
    pub store: Arc<dyn ContentStore>,
    pub controllers: CacheControllers,
    pub request_timeout: Duration,
}

/// Start a proxy server for testing.
///
/// The repository's public URL is the server's own address, so rewritten
/// archive URLs can be fetched straight back through it.
pub async fn start_test_server(
    options: ServerOptions,
) -> anyhow::Result<(SocketAddr, Arc<Repository>, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let upstream = HttpUpstream::new(
        &UpstreamConfig::new(options.upstream_url).with_timeout(Duration::from_secs(10)),
    )?;
    let repository = Repository::new(ProxyFacet::new(ProxyFacetParts {
        store: options.store,
        upstream: Arc::new(upstream),
        codec: Arc::new(ComposerJsonCodec::new()),
        controllers: options.controllers,
        repository_url: format!("http://{}", addr),
    }));

    let state = Arc::new(AppState::new(Arc::clone(&repository), options.request_timeout));
    let app = create_router(state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok((addr, repository, handle))
}

/// Create an HTTP client for testing.
pub fn test_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create test client")
}

/// HTTP client bound to one proxy server.
#[derive(Clone)]
pub struct ApiTestClient {
    client: Client,
    base_url: String,
}

impl ApiTestClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            client: test_client(),
            base_url: format!("http://{}", addr),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    /// Fetch an absolute URL, e.g. one taken from a rewritten document.
    pub async fn get_url(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(url).send().await
    }

    pub async fn post(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.post(self.url(path)).send().await
    }

    /// GET a path and parse the body as JSON, returning the cache header too.
    pub async fn get_json(&self, path: &str) -> anyhow::Result<(String, serde_json::Value)> {
        let resp = self.get(path).await?.error_for_status()?;
        let cache = x_cache(&resp);
        Ok((cache, resp.json().await?))
    }

    /// Check health endpoint.
    pub async fn health(&self) -> anyhow::Result<bool> {
        let resp = self.get("/health").await?;
        Ok(resp.status().is_success())
    }

    pub async fn stats(&self) -> anyhow::Result<serde_json::Value> {
        Ok(self.get("/stats").await?.error_for_status()?.json().await?)
    }
}

/// Value of the `x-cache` header, or an empty string.
pub fn x_cache(resp: &reqwest::Response) -> String {
    resp.headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
