//! Request routing and the fetch-or-serve pipeline.

use chrono::Utc;
use comproxy_core::asset::LIST_JSON;
use comproxy_core::{
    Asset, AssetKind, CacheController, CacheControllers, CacheInfo, CacheStatus, ContentStore,
    Content, Dispatch, DispatchAttributes, DispatchResponse, Error, MetadataCodec, Result,
    Upstream, UpstreamResponse,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::inflight::{InflightFetches, Role};
use crate::metrics::ProxyMetrics;
use crate::resolver::ZipballResolver;

/// Everything needed to handle one request.
///
/// Built by the repository at classification time. The controller is the
/// one selected for the asset's cache type and stays fixed for the request.
#[derive(Clone)]
pub struct RequestContext {
    pub asset: Asset,
    pub attributes: DispatchAttributes,
    pub controller: CacheController,
    /// Route back into the repository for internal lookups.
    pub dispatcher: Arc<dyn Dispatch>,
}

/// Collaborators of the proxy facet.
pub struct ProxyFacetParts {
    pub store: Arc<dyn ContentStore>,
    pub upstream: Arc<dyn Upstream>,
    pub codec: Arc<dyn MetadataCodec>,
    pub controllers: CacheControllers,
    /// Public base URL of this repository.
    pub repository_url: String,
}

/// Serves the four asset kinds of a Composer repository from cache or upstream.
#[derive(Clone)]
pub struct ProxyFacet {
    store: Arc<dyn ContentStore>,
    upstream: Arc<dyn Upstream>,
    codec: Arc<dyn MetadataCodec>,
    resolver: ZipballResolver,
    controllers: CacheControllers,
    repository_url: Arc<str>,
    inflight: Arc<InflightFetches<(Content, CacheStatus)>>,
    metrics: Arc<ProxyMetrics>,
}

impl ProxyFacet {
    pub fn new(parts: ProxyFacetParts) -> Self {
        Self {
            resolver: ZipballResolver::new(Arc::clone(&parts.codec)),
            store: parts.store,
            upstream: parts.upstream,
            codec: parts.codec,
            controllers: parts.controllers,
            repository_url: Arc::from(parts.repository_url.trim_end_matches('/')),
            inflight: Arc::new(InflightFetches::new()),
            metrics: ProxyMetrics::new(),
        }
    }

    pub fn controllers(&self) -> &CacheControllers {
        &self.controllers
    }

    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    /// Serve a classified request.
    pub async fn get(&self, ctx: RequestContext) -> Result<DispatchResponse> {
        let key = ctx.asset.cache_key();
        let kind = ctx.asset.kind();
        let attributes = ctx.attributes;

        let (content, cache_status) = match self.store.get(&key).await? {
            Some(content) if ctx.controller.is_fresh(&content.cache_info, Utc::now()) => {
                debug!(asset = %ctx.asset, "Cache hit");
                (content, CacheStatus::Hit)
            }
            _ => {
                let facet = self.clone();
                let (role, result) = self
                    .inflight
                    .run(&key, async move { facet.refresh(ctx).await })
                    .await;
                if role == Role::Joined {
                    debug!(key = %key, "Joined in-flight fetch");
                    self.metrics.record_joined();
                }
                result?
            }
        };
        // Internal lookups are part of the client request that caused them.
        if !attributes.suppress_rewrite {
            self.metrics.record_status(cache_status);
        }

        let content = self.client_view(kind, attributes, content)?;
        Ok(DispatchResponse {
            kind,
            content,
            cache_status,
        })
    }

    /// Bring the stored copy up to date, falling back to it when allowed.
    async fn refresh(&self, ctx: RequestContext) -> Result<(Content, CacheStatus)> {
        let key = ctx.asset.cache_key();

        // Another fetch may have stored it since the caller looked.
        let cached = self.store.get(&key).await?;
        if let Some(content) = &cached {
            if ctx.controller.is_fresh(&content.cache_info, Utc::now()) {
                debug!(asset = %ctx.asset, "Cache hit after waiting");
                return Ok((content.clone(), CacheStatus::Hit));
            }
            debug!(asset = %ctx.asset, "Cached copy is stale");
        } else {
            debug!(asset = %ctx.asset, "Cache miss");
        }

        match self.fetch_and_store(&ctx, &key, cached.as_ref()).await {
            Ok(fetched) => Ok(fetched),
            Err(err) if err.is_transport() && ctx.controller.stale_on_error => match cached {
                Some(content) => {
                    warn!(asset = %ctx.asset, error = %err, "Upstream failed, serving stale copy");
                    Ok((content, CacheStatus::Stale))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn fetch_and_store(
        &self,
        ctx: &RequestContext,
        key: &str,
        cached: Option<&Content>,
    ) -> Result<(Content, CacheStatus)> {
        let kind = ctx.asset.kind();
        let status = if cached.is_some() {
            CacheStatus::Revalidated
        } else {
            CacheStatus::Miss
        };

        if let Asset::PackageIndex = ctx.asset {
            let list = ctx
                .dispatcher
                .dispatch(LIST_JSON, DispatchAttributes::internal_raw())
                .await?;
            let payload = self
                .codec
                .synthesize_package_index(&self.repository_url, &list.content.payload)?;
            let content = Content::new(payload, kind.content_type(), CacheInfo::fetched_now());
            let stored = self.store.put(key, content, kind).await?;
            info!(key, size = stored.size(), "Stored synthesized package index");
            return Ok((stored, status));
        }

        let url = self.origin_url(ctx).await?;
        let validators = cached
            .map(|content| &content.cache_info)
            .filter(|info| ctx.controller.revalidate && info.has_validators());

        self.metrics.record_upstream_fetch();
        let response = self
            .upstream
            .fetch(&url, validators)
            .await
            .inspect_err(|_| self.metrics.record_upstream_failure())?;

        match (response, cached) {
            (UpstreamResponse::NotModified, Some(cached)) => {
                let cache_info = cached.cache_info.verified_at(Utc::now());
                self.store.set_cache_info(key, cached, cache_info.clone()).await?;
                debug!(key, "Upstream confirmed cached copy");
                Ok((
                    Content {
                        cache_info,
                        ..cached.clone()
                    },
                    CacheStatus::Revalidated,
                ))
            }
            (UpstreamResponse::NotModified, None) => {
                self.metrics.record_upstream_failure();
                Err(Error::Upstream {
                    url,
                    status: Some(304),
                    message: "not modified without a cached copy".to_string(),
                })
            }
            (UpstreamResponse::Fetched(mut content), _) => {
                self.metrics.record_upstream_bytes(content.size());
                content.content_type = kind.content_type().to_string();
                let stored = self.store.put(key, content, kind).await?;
                info!(key, size = stored.size(), "Stored upstream content");
                Ok((stored, status))
            }
        }
    }

    /// URL to fetch an asset from, relative to the upstream unless absolute.
    async fn origin_url(&self, ctx: &RequestContext) -> Result<String> {
        match &ctx.asset {
            Asset::PackageIndex => Err(Error::ContractViolation(
                "package index is synthesized and has no origin url".to_string(),
            )),
            Asset::PackageList | Asset::ProviderMetadata { .. } => Ok(ctx.asset.cache_key()),
            Asset::DistributionArchive {
                vendor,
                project,
                version,
                ..
            } => {
                self.resolver
                    .resolve(ctx.dispatcher.as_ref(), vendor, project, version)
                    .await
            }
        }
    }

    /// Apply client-facing transformations to stored content.
    fn client_view(&self, kind: AssetKind, attributes: DispatchAttributes, content: Content) -> Result<Content> {
        match kind {
            AssetKind::ProviderMetadata if !attributes.suppress_rewrite => {
                let payload = self.codec.rewrite_provider(&self.repository_url, &content.payload)?;
                Ok(Content { payload, ..content })
            }
            _ => Ok(content),
        }
    }
}
