//! Command handlers.

use anyhow::Context;
use comproxy_api::{AppState, create_router};
use comproxy_cache::{FilesystemStore, MemoryStore};
use comproxy_core::{ContentStore, classify};
use comproxy_proxy::{ComposerJsonCodec, HttpUpstream, ProxyFacet, ProxyFacetParts, Repository};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{Settings, StorageBackend, StorageConfig};

async fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn ContentStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Filesystem => {
            let store = FilesystemStore::open(&config.path)
                .await
                .with_context(|| format!("opening content store at {}", config.path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the repository described by the settings.
pub async fn build_repository(settings: &Settings) -> anyhow::Result<Arc<Repository>> {
    let store = open_store(&settings.storage).await?;
    let upstream = HttpUpstream::new(&settings.upstream)?;

    let facet = ProxyFacet::new(ProxyFacetParts {
        store,
        upstream: Arc::new(upstream),
        codec: Arc::new(ComposerJsonCodec::new()),
        controllers: settings.cache.controllers()?,
        repository_url: settings.server.public_url.clone(),
    });
    Ok(Repository::new(facet))
}

/// Run the proxy until interrupted.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let repository = build_repository(settings).await?;
    let state = Arc::new(AppState::new(repository, settings.server.request_timeout()));
    let app = create_router(state);

    let listener = TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding {}", settings.server.bind))?;

    info!(
        bind = %settings.server.bind,
        upstream = %settings.upstream.url,
        public_url = %settings.server.public_url,
        storage = ?settings.storage.backend,
        "comproxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("comproxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

/// Print the effective configuration.
pub fn show_config(settings: &Settings) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(settings)?);
    Ok(())
}

/// Describe how a path would be routed.
pub fn check(settings: &Settings, path: &str) -> anyhow::Result<()> {
    let asset = classify(path)?;
    let kind = asset.kind();
    let controller = settings.cache.controllers()?.get(kind.cache_type());

    println!("kind:         {}", kind);
    println!("cache key:    {}", asset.cache_key());
    println!("cache type:   {:?}", kind.cache_type());
    println!(
        "max age:      {}",
        controller
            .max_age
            .map(|age| format!("{} minutes", age.num_minutes()))
            .unwrap_or_else(|| "never expires".to_string())
    );
    println!("content type: {}", kind.content_type());
    Ok(())
}
