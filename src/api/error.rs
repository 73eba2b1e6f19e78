//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::PipelineError;

/// Error response body: human-readable `error` plus a stable `kind` code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(err) => match err {
                PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                PipelineError::Cancelled => StatusCode::REQUEST_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Internal(_) => "internal",
            ApiError::Pipeline(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".to_string()
            }
            ApiError::RateLimited { retry_after } => {
                format!("Rate limit exceeded. Retry after {retry_after}s")
            }
            ApiError::Pipeline(err) => {
                if status == StatusCode::BAD_GATEWAY {
                    tracing::warn!(kind = err.kind(), detail = %err.detail(), "Analysis failed");
                }
                err.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: message,
            kind: self.kind(),
        };

        let mut response = (status, Json(body)).into_response();
        // Add retry-after header for rate limited responses
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}
