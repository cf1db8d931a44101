//! In-memory content store.

use async_trait::async_trait;
use comproxy_core::{AssetKind, CacheInfo, Content, ContentStore, Result, StoreStats};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::keys::validate_key;

/// Content store backed by a map; entries are swapped whole under a write lock.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Content>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Content>> {
        let entries = self.entries.read().await;
        Ok(entries.get(path).cloned())
    }

    async fn put(&self, path: &str, content: Content, kind: AssetKind) -> Result<Content> {
        validate_key(path)?;
        debug!(path, %kind, size = content.size(), "Storing content in memory");

        let mut entries = self.entries.write().await;
        entries.insert(path.to_string(), content.clone());
        Ok(content)
    }

    async fn set_cache_info(&self, path: &str, content: &Content, cache_info: CacheInfo) -> Result<()> {
        validate_key(path)?;

        let mut entries = self.entries.write().await;
        match entries.get_mut(path) {
            Some(stored) => stored.cache_info = cache_info,
            None => {
                let mut content = content.clone();
                content.cache_info = cache_info;
                entries.insert(path.to_string(), content);
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(path).is_some())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entries = self.entries.read().await;
        Ok(StoreStats {
            entries: entries.len() as u64,
            total_bytes: entries.values().map(Content::size).sum(),
        })
    }
}
