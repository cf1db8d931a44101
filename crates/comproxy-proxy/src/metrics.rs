//! Counters for proxy observability.

use comproxy_core::CacheStatus;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the proxy facet.
///
/// The cache status counters count client requests. Upstream counters
/// include fetches made for internal lookups.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    /// Responses served from a fresh stored copy.
    pub hits: AtomicU64,
    /// Responses that had nothing stored.
    pub misses: AtomicU64,
    /// Stale copies confirmed or replaced by upstream.
    pub revalidated: AtomicU64,
    /// Stale copies served because upstream failed.
    pub stale_served: AtomicU64,
    /// Requests sent to upstream.
    pub upstream_fetches: AtomicU64,
    /// Upstream requests that failed.
    pub upstream_failures: AtomicU64,
    /// Requests that joined a fetch already in flight.
    pub joined_fetches: AtomicU64,
    /// Total payload bytes received from upstream.
    pub bytes_fetched: AtomicU64,
}

impl ProxyMetrics {
    /// Create new metrics instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record how a response was satisfied.
    pub fn record_status(&self, status: CacheStatus) {
        let counter = match status {
            CacheStatus::Hit => &self.hits,
            CacheStatus::Miss => &self.misses,
            CacheStatus::Revalidated => &self.revalidated,
            CacheStatus::Stale => &self.stale_served,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_bytes(&self, bytes: u64) {
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_joined(&self) {
        self.joined_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            revalidated: self.revalidated.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            joined_fetches: self.joined_fetches.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub revalidated: u64,
    pub stale_served: u64,
    pub upstream_fetches: u64,
    pub upstream_failures: u64,
    pub joined_fetches: u64,
    pub bytes_fetched: u64,
}
