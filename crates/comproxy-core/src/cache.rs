//! Cached content and freshness policy.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Freshness class an asset kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// Index, listing and provider documents; change over time.
    Metadata,
    /// Distribution archives; effectively immutable once published.
    Content,
}

/// Cache bookkeeping stored alongside a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// When the payload was last fetched from upstream.
    pub fetched_at: DateTime<Utc>,
    /// When upstream last confirmed the payload (fetch or 304).
    pub last_verified: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheInfo {
    /// Cache info for a payload fetched right now.
    pub fn fetched_now() -> Self {
        let now = Utc::now();
        Self {
            fetched_at: now,
            last_verified: now,
            etag: None,
            last_modified: None,
        }
    }

    pub fn with_validators(mut self, etag: Option<String>, last_modified: Option<String>) -> Self {
        self.etag = etag;
        self.last_modified = last_modified;
        self
    }

    /// Same payload, confirmed unchanged at `at`.
    pub fn verified_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_verified: at,
            ..self.clone()
        }
    }

    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// A payload plus its cache metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub payload: Bytes,
    pub content_type: String,
    pub cache_info: CacheInfo,
}

impl Content {
    pub fn new(payload: impl Into<Bytes>, content_type: impl Into<String>, cache_info: CacheInfo) -> Self {
        Self {
            payload: payload.into(),
            content_type: content_type.into(),
            cache_info,
        }
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// How a response was satisfied relative to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    /// Stored copy was fresh.
    Hit,
    /// Nothing usable was stored; fetched from origin.
    Miss,
    /// Stored copy was stale and upstream confirmed or replaced it.
    Revalidated,
    /// Stored copy was stale and served because upstream failed.
    Stale,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Revalidated => "REVALIDATED",
            CacheStatus::Stale => "STALE",
        }
    }
}

/// Content store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// Freshness policy for one [`CacheType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheController {
    /// Age after which a stored copy must be revalidated. `None` never expires.
    pub max_age: Option<Duration>,
    /// Send conditional requests using stored validators when stale.
    pub revalidate: bool,
    /// Serve a stale copy when upstream cannot be reached.
    pub stale_on_error: bool,
}

impl CacheController {
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            max_age,
            revalidate: true,
            stale_on_error: false,
        }
    }

    /// Build from a minute count, where a negative value disables expiry.
    ///
    /// Fails when the age does not fit in a [`Duration`].
    pub fn from_minutes(minutes: i64) -> Result<Self> {
        if minutes < 0 {
            return Ok(Self::new(None));
        }
        let max_age = Duration::try_minutes(minutes).ok_or_else(|| {
            Error::Config(format!(
                "max age of {} minutes is out of range, use a negative value to never expire",
                minutes
            ))
        })?;
        Ok(Self::new(Some(max_age)))
    }

    pub fn with_revalidate(mut self, revalidate: bool) -> Self {
        self.revalidate = revalidate;
        self
    }

    pub fn with_stale_on_error(mut self, stale_on_error: bool) -> Self {
        self.stale_on_error = stale_on_error;
        self
    }

    /// Whether the stored copy may be served at `now` without contacting upstream.
    pub fn is_fresh(&self, info: &CacheInfo, now: DateTime<Utc>) -> bool {
        match self.max_age {
            None => true,
            Some(max_age) => now.signed_duration_since(info.last_verified) < max_age,
        }
    }

    pub fn is_stale(&self, info: &CacheInfo, now: DateTime<Utc>) -> bool {
        !self.is_fresh(info, now)
    }
}

impl Default for CacheController {
    fn default() -> Self {
        // 24 hours, the usual proxy repository default
        Self::new(Some(Duration::hours(24)))
    }
}

/// Controllers keyed by cache type. Read-only once built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControllers {
    pub metadata: CacheController,
    pub content: CacheController,
}

impl CacheControllers {
    pub fn new(metadata: CacheController, content: CacheController) -> Self {
        Self { metadata, content }
    }

    pub fn get(&self, cache_type: CacheType) -> CacheController {
        match cache_type {
            CacheType::Metadata => self.metadata,
            CacheType::Content => self.content,
        }
    }
}
