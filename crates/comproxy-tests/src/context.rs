//! Test context wiring a proxy server to a mock upstream.

use comproxy_cache::{FilesystemStore, MemoryStore};
use comproxy_core::{CacheControllers, ContentStore};
use comproxy_proxy::Repository;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wiremock::MockServer;

use crate::helpers::{ApiTestClient, ServerOptions, start_test_server};

/// A running proxy in front of a mock upstream.
///
/// Dropping the context stops the server and verifies the upstream's
/// mock expectations.
pub struct TestContext {
    pub upstream: MockServer,
    pub addr: SocketAddr,
    pub client: ApiTestClient,
    pub repository: Arc<Repository>,
    handle: JoinHandle<()>,
}

impl TestContext {
    /// Proxy with an in-memory store and default cache policy.
    pub async fn new() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    pub fn builder() -> TestContextBuilder {
        TestContextBuilder::default()
    }

    /// Base URL of the mock upstream.
    pub fn upstream_url(&self) -> String {
        self.upstream.uri()
    }

    /// Number of requests the upstream received for a path.
    pub async fn upstream_hits(&self, path: &str) -> usize {
        self.upstream
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Options for a [`TestContext`].
pub struct TestContextBuilder {
    controllers: CacheControllers,
    storage_dir: Option<PathBuf>,
    request_timeout: Duration,
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self {
            controllers: CacheControllers::default(),
            storage_dir: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl TestContextBuilder {
    pub fn controllers(mut self, controllers: CacheControllers) -> Self {
        self.controllers = controllers;
        self
    }

    /// Use a filesystem store rooted at `dir` instead of memory.
    pub fn filesystem(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn start(self) -> anyhow::Result<TestContext> {
        self.start_with(MockServer::start().await).await
    }

    /// Start against an upstream the caller already prepared.
    pub async fn start_with(self, upstream: MockServer) -> anyhow::Result<TestContext> {
        crate::init_test_logging();

        let store: Arc<dyn ContentStore> = match self.storage_dir {
            Some(dir) => Arc::new(FilesystemStore::open(dir).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let (addr, repository, handle) = start_test_server(ServerOptions {
            upstream_url: upstream.uri(),
            store,
            controllers: self.controllers,
            request_timeout: self.request_timeout,
        })
        .await?;

        Ok(TestContext {
            upstream,
            addr,
            client: ApiTestClient::new(addr),
            repository,
            handle,
        })
    }
}
