//! API router.
//!
//! Returns a composable `Router` with all routes under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS → 2. Access log → 3. Rate limiter → Handler

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::models::MAX_IMAGE_BYTES;

/// Request body ceiling: one maximum-size image plus multipart framing.
const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Access log → Rate limit (innermost) → Handler
    //
    // Extension must be outermost so all middleware can access ApiContext.
    let analysis = Router::new()
        .route("/analyze/text", post(endpoints::analyze::text))
        .route("/analyze/image", post(endpoints::analyze::image))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::access_log::log_access))
        .layer(axum::Extension(ctx));

    // Health stays outside the rate limiter so probes never see 429.
    let health = Router::new().route("/health", get(endpoints::health::check));

    Router::new()
        .nest("/api", analysis)
        .nest("/api", health)
        .layer(CorsLayer::permissive())
}
