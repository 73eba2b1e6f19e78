//! Request logging middleware.
//!
//! Logs method, path, status and latency for every request. Runs
//! outermost so rate-limited rejections are logged too.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::warn!(%method, %path, status, elapsed_ms, "API request");
    } else {
        tracing::info!(%method, %path, status, elapsed_ms, "API request");
    }

    response
}
