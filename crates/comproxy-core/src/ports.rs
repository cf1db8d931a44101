//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the proxy core and the
//! collaborators it drives: storage, upstream transport, the metadata codec
//! and the repository's own dispatcher.

use crate::asset::AssetKind;
use crate::cache::{CacheInfo, CacheStatus, Content, StoreStats};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Addressable content storage keyed by cache key path.
///
/// Implementations must make `put` and `set_cache_info` atomic with respect
/// to concurrent `get`s of the same path.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Get stored content and its cache metadata.
    async fn get(&self, path: &str) -> Result<Option<Content>>;

    /// Store content under a path, replacing anything already there.
    async fn put(&self, path: &str, content: Content, kind: AssetKind) -> Result<Content>;

    /// Replace only the cache metadata of stored content.
    async fn set_cache_info(&self, path: &str, content: &Content, cache_info: CacheInfo) -> Result<()>;

    /// Remove stored content. Returns whether anything was removed.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Entry count and total payload size.
    async fn stats(&self) -> Result<StoreStats>;

    /// Cheap check that the store can serve requests.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Result of an upstream fetch.
#[derive(Debug, Clone)]
pub enum UpstreamResponse {
    /// Upstream supplied a (new) payload.
    Fetched(Content),
    /// Upstream confirmed the validators sent still match.
    NotModified,
}

/// Upstream transport.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a URL, relative to the upstream repository unless absolute.
    ///
    /// When `validators` is given the request is conditional and may yield
    /// [`UpstreamResponse::NotModified`].
    async fn fetch(&self, url: &str, validators: Option<&CacheInfo>) -> Result<UpstreamResponse>;
}

/// Parses and generates Composer metadata documents.
pub trait MetadataCodec: Send + Sync {
    /// Build the root package index from the package-name listing.
    fn synthesize_package_index(&self, repository_url: &str, package_list: &[u8]) -> Result<Bytes>;

    /// Extract the upstream distribution URL of one package version.
    fn resolve_dist_url(
        &self,
        vendor: &str,
        project: &str,
        version: &str,
        provider: &[u8],
    ) -> Result<String>;

    /// Point every distribution URL of a provider document at the proxy.
    fn rewrite_provider(&self, repository_url: &str, provider: &[u8]) -> Result<Bytes>;
}

/// Request attributes carried through self-dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchAttributes {
    /// Serve documents as stored, without client-facing URL rewriting.
    pub suppress_rewrite: bool,
}

impl DispatchAttributes {
    /// Attributes for an inbound client request.
    pub fn client() -> Self {
        Self::default()
    }

    /// Attributes for an internal lookup that needs raw upstream documents.
    pub fn internal_raw() -> Self {
        Self {
            suppress_rewrite: true,
        }
    }
}

/// Response produced by dispatching a request.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub kind: AssetKind,
    pub content: Content,
    pub cache_status: CacheStatus,
}

/// Ability to issue a request against the repository itself.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, path: &str, attributes: DispatchAttributes) -> Result<DispatchResponse>;
}
