//! Composer repository proxy.
//!
//! [`Repository`] classifies each request and hands it to the
//! [`ProxyFacet`], which serves from the content store or fetches from the
//! upstream repository. Package indexes and archive origins are resolved
//! through internal requests back into the same repository.

pub mod codec;
pub mod config;
pub mod facet;
pub mod inflight;
pub mod metrics;
pub mod repository;
pub mod resolver;
pub mod upstream;

pub use codec::ComposerJsonCodec;
pub use config::{CachePolicyConfig, UpstreamConfig};
pub use facet::{ProxyFacet, ProxyFacetParts, RequestContext};
pub use inflight::{InflightFetches, Role};
pub use metrics::{MetricsSnapshot, ProxyMetrics};
pub use repository::Repository;
pub use resolver::ZipballResolver;
pub use upstream::HttpUpstream;
