//! Persisted store records.

use comproxy_core::{AssetKind, CacheInfo};
use serde::{Deserialize, Serialize};

/// Metadata record written next to a stored payload.
///
/// The payload itself lives in an immutable blob named by `blob`, so a
/// record always describes exactly one complete payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Cache key path.
    pub key: String,
    pub kind: AssetKind,
    /// sha256 of the payload.
    pub blob: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub cache_info: CacheInfo,
}
