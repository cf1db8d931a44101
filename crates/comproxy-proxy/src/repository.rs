//! The proxy repository: classification plus self-dispatch.

use async_trait::async_trait;
use comproxy_core::{
    classify, Dispatch, DispatchAttributes, DispatchResponse, Error, Result, StoreStats,
};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::facet::{ProxyFacet, RequestContext};
use crate::metrics::MetricsSnapshot;

/// Entry point for every request, inbound or internal.
///
/// Holds a weak reference to itself so the contexts it builds can route
/// sub-requests back through [`Dispatch`] without a reference cycle.
pub struct Repository {
    this: Weak<Repository>,
    facet: ProxyFacet,
}

impl Repository {
    pub fn new(facet: ProxyFacet) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            facet,
        })
    }

    pub fn facet(&self) -> &ProxyFacet {
        &self.facet
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.facet.metrics().snapshot()
    }

    pub async fn store_stats(&self) -> Result<StoreStats> {
        self.facet.store().stats().await
    }

    /// Whether the content store is usable, without scanning its entries.
    pub async fn store_health(&self) -> Result<()> {
        self.facet.store().health_check().await
    }

    fn dispatcher(&self) -> Result<Arc<dyn Dispatch>> {
        let this: Arc<dyn Dispatch> = self
            .this
            .upgrade()
            .ok_or_else(|| Error::ContractViolation("repository dispatched after shutdown".to_string()))?;
        Ok(this)
    }
}

#[async_trait]
impl Dispatch for Repository {
    async fn dispatch(&self, path: &str, attributes: DispatchAttributes) -> Result<DispatchResponse> {
        let asset = classify(path)?;
        let controller = self.facet.controllers().get(asset.kind().cache_type());
        debug!(asset = %asset, internal = attributes.suppress_rewrite, "Dispatching");

        let ctx = RequestContext {
            asset,
            attributes,
            controller,
            dispatcher: self.dispatcher()?,
        };
        self.facet.get(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ComposerJsonCodec;
    use crate::facet::ProxyFacetParts;
    use async_trait::async_trait;
    use comproxy_cache::MemoryStore;
    use comproxy_core::{AssetKind, CacheControllers, CacheInfo, CacheStatus, Content, Upstream, UpstreamResponse};

    struct StaticUpstream;

    #[async_trait]
    impl Upstream for StaticUpstream {
        async fn fetch(&self, url: &str, _validators: Option<&CacheInfo>) -> Result<UpstreamResponse> {
            match url {
                "packages/list.json" => Ok(UpstreamResponse::Fetched(Content::new(
                    br#"{"packageNames":["acme/widget"]}"#.to_vec(),
                    "application/json",
                    CacheInfo::fetched_now(),
                ))),
                other => Err(Error::upstream_status(other, 404)),
            }
        }
    }

    fn repository() -> Arc<Repository> {
        Repository::new(ProxyFacet::new(ProxyFacetParts {
            store: Arc::new(MemoryStore::new()),
            upstream: Arc::new(StaticUpstream),
            codec: Arc::new(ComposerJsonCodec::new()),
            controllers: CacheControllers::default(),
            repository_url: "http://localhost:8080/".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path() {
        let err = tokio_test::assert_err!(
            repository()
                .dispatch("/index.html", DispatchAttributes::client())
                .await
        );
        assert!(matches!(err, Error::NoRoute(_)));
    }

    #[tokio::test]
    async fn test_dispatch_with_leading_slash() {
        let repo = repository();
        let response = tokio_test::assert_ok!(
            repo.dispatch("/packages/list.json", DispatchAttributes::client())
                .await
        );
        assert_eq!(response.kind, AssetKind::PackageList);
        assert_eq!(response.cache_status, CacheStatus::Miss);

        let again = repo.dispatch("packages/list.json", DispatchAttributes::client()).await.unwrap();
        assert_eq!(again.cache_status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn test_index_uses_trimmed_repository_url() {
        let repo = repository();
        let response = repo.dispatch("packages.json", DispatchAttributes::client()).await.unwrap();
        let index: serde_json::Value = serde_json::from_slice(&response.content.payload).unwrap();
        assert_eq!(index["providers-url"], "http://localhost:8080/p/%package%.json");

        let stats = repo.store_stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(repo.metrics().upstream_fetches, 1);
    }
}
