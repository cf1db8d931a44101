//! Fetch deduplication keyed by cache key path.
//!
//! The first request for a key becomes the leader and starts the fetch as a
//! [`Shared`] future; the map only keeps a [`WeakShared`] handle to it, so
//! later requests for the same key join while any request is still waiting.
//! Once every waiter is gone the fetch is dropped, which cancels whatever
//! sub-requests it had started.

use comproxy_core::Result;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T>>>;
type Entries<T> = Mutex<HashMap<String, (u64, WeakShared<BoxFuture<'static, Result<T>>>)>>;

/// How a caller took part in a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Started the fetch.
    Leader,
    /// Waited on a fetch another request had already started.
    Joined,
}

/// Registry of fetches currently in flight.
pub struct InflightFetches<T> {
    next_id: AtomicU64,
    entries: Arc<Entries<T>>,
}

impl<T> Default for InflightFetches<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> InflightFetches<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fetch` for `key`, or join the fetch already running for it.
    ///
    /// `fetch` is only polled when this caller ends up leading.
    pub async fn run<F>(&self, key: &str, fetch: F) -> (Role, Result<T>)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (role, shared) = self.join_or_lead(key, fetch);
        (role, shared.await)
    }

    fn join_or_lead<F>(&self, key: &str, fetch: F) -> (Role, SharedFetch<T>)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(running) = entries.get(key).and_then(|(_, weak)| weak.upgrade()) {
            return (Role::Joined, running);
        }

        // Entries whose waiters all went away are dead weight.
        entries.retain(|_, (_, weak)| weak.upgrade().is_some());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.entries);
        let owned_key = key.to_string();
        let shared = async move {
            let result = fetch.await;
            let mut entries = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.get(&owned_key).is_some_and(|(entry_id, _)| *entry_id == id) {
                entries.remove(&owned_key);
            }
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            entries.insert(key.to_string(), (id, weak));
        }
        (Role::Leader, shared)
    }

    /// Number of keys with a live fetch.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|(_, weak)| weak.upgrade().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
