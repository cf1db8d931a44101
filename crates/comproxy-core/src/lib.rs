//! Comproxy Core
//!
//! Core domain types, traits, and error handling for comproxy, a caching
//! proxy for Composer package repositories. This crate has minimal
//! dependencies and defines the shared vocabulary used across all other
//! crates.

pub mod asset;
pub mod cache;
pub mod error;
pub mod ports;

pub use asset::{Asset, AssetKind, Tokens, classify, match_path};
pub use cache::{
    CacheController, CacheControllers, CacheInfo, CacheStatus, CacheType, Content, StoreStats,
};
pub use error::{Error, Result};
pub use ports::{
    ContentStore, Dispatch, DispatchAttributes, DispatchResponse, MetadataCodec, Upstream,
    UpstreamResponse,
};
