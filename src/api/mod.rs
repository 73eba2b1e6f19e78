//! HTTP API.
//!
//! Exposes the analysis pipeline as JSON endpoints under `/api/`:
//! text and image analysis plus a health check. Routes share one
//! `ApiContext` and sit behind rate limiting and access logging.
//!
//! The router is composable: `api_router()` returns a `Router` that can
//! be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::{ApiContext, RateLimiter};
