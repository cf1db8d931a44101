//! Content store backends for comproxy.

pub mod filesystem;
pub mod keys;
pub mod memory;
pub mod types;

pub use filesystem::FilesystemStore;
pub use keys::{digest, validate_key};
pub use memory::MemoryStore;
pub use types::StoredRecord;
