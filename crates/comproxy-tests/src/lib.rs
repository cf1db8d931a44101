//! Integration test infrastructure for comproxy.
//!
//! Each [`TestContext`] runs a real proxy server on an ephemeral port in
//! front of a `wiremock` upstream.
//!
//! # Usage
//!
//! ```ignore
//! use comproxy_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new().await.unwrap();
//!     // Mount mocks on ctx.upstream, request through ctx.client.
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::{TestContext, TestContextBuilder};
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,comproxy_proxy=debug")),
        )
        .with_test_writer()
        .try_init();
}
