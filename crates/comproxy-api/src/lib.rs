//! HTTP server for comproxy.
//!
//! Every GET outside the operational endpoints is handed to the
//! [`Repository`](comproxy_proxy::Repository) as a Composer repository path.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
