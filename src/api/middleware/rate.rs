//! Per-client rate limiting middleware.
//!
//! Sliding-window limits per client address, sized from configuration.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Extract a rate-limit key from the request.
///
/// Keys on the peer address. The first `X-Forwarded-For` hop is used only
/// when `trust_proxy` is set, since clients can write that header freely.
fn rate_key(req: &Request<axum::body::Body>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return format!("ip:{ip}");
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Per-client rate limiting. Returns 429 if exceeded.
/// Accesses `ApiContext` from request extensions.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request<axum::body::Body>, next: Next) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req, ctx.trust_proxy);

    // MutexGuard is !Send, must drop before .await via block scope
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter.check(&key).map_err(|retry_after| {
            tracing::debug!(%key, retry_after, "Rate limit hit");
            ApiError::RateLimited { retry_after }
        })?;
    }

    Ok(next.run(req).await)
}
