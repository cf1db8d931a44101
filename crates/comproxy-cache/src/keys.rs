//! Storage key utilities.

use comproxy_core::{Error, Result};
use sha2::{Digest, Sha256};

/// Hex-encoded sha256 of arbitrary bytes.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Reject keys that could address storage outside the store root.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::Storage(format!("Invalid storage key: {:?}", key)));
    }
    Ok(())
}
