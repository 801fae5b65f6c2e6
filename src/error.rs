use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::ErrorBody;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit of {limit} exceeded, retry in {retry_after}s")]
    RateLimited { limit: u32, retry_after: u64 },
    #[error("no healthy backends available")]
    NoHealthyBackend,
    #[error("upstream {backend} failed: {reason}")]
    Upstream { backend: String, reason: String },
    #[error("request body larger than {0} bytes")]
    PayloadTooLarge(usize),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::RateLimited { limit, retry_after } => {
                let body = ErrorBody::new(
                    "RATE_LIMIT_EXCEEDED",
                    "Too many requests. Please try again later.",
                )
                .with_retry_after(retry_after);

                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        (X_RATELIMIT_LIMIT, HeaderValue::from(limit)),
                        (X_RATELIMIT_REMAINING, HeaderValue::from(0u32)),
                        (header::RETRY_AFTER, HeaderValue::from(retry_after)),
                    ],
                    Json(body),
                )
                    .into_response()
            }
            GatewayError::NoHealthyBackend => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::new(
                    "NO_HEALTHY_BACKEND",
                    "Service temporarily unavailable",
                )),
            )
                .into_response(),
            GatewayError::Upstream { backend, reason } => {
                // Log the real error server-side, return generic message to client
                tracing::error!(%backend, %reason, "upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorBody::new("UPSTREAM_ERROR", "Upstream request failed")),
                )
                    .into_response()
            }
            GatewayError::PayloadTooLarge(limit) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorBody::new(
                    "PAYLOAD_TOO_LARGE",
                    format!("Request body exceeds {limit} bytes"),
                )),
            )
                .into_response(),
        }
    }
}
