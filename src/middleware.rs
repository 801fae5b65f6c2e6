use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::config::{DEFAULT_SCOPE, RoutePolicies};
use crate::error::{GatewayError, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
use crate::identity::client_identity;
use crate::metrics::{RATE_LIMIT_ALLOWED, RATE_LIMIT_REJECTED};
use crate::rate_limit::RateLimiter;

// Everything the rate limit layer needs, cheap to clone per request
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub policies: Arc<RoutePolicies>,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, policies: RoutePolicies) -> Self {
        Self {
            limiter,
            policies: Arc::new(policies),
        }
    }
}

// Counters for route overrides live in their own namespace so a tight
// login limit does not eat into the general quota
fn counter_key(scope: &str, identity: String) -> String {
    if scope == DEFAULT_SCOPE {
        identity
    } else {
        format!("{scope}|{identity}")
    }
}

/// Rate limit in front of the wrapped handler.
///
/// Rejected requests never reach the handler and get a 429 with
/// `Retry-After`. Accepted responses carry `X-RateLimit-Limit` and
/// `X-RateLimit-Remaining`.
pub async fn enforce_rate_limit(
    State(guard): State<RateLimitGuard>,
    req: Request,
    next: Next,
) -> Response {
    let identity = client_identity(req.headers());
    let (scope, config) = guard.policies.resolve(req.uri().path());
    let key = counter_key(scope, identity);

    let decision = guard.limiter.check(&key, &config);

    if !decision.allowed {
        let retry_after = decision.retry_after.unwrap_or(1);
        RATE_LIMIT_REJECTED.with_label_values(&[scope]).inc();
        tracing::warn!(%key, scope, retry_after, "rate limit exceeded");
        return GatewayError::RateLimited {
            limit: decision.limit,
            retry_after,
        }
        .into_response();
    }

    RATE_LIMIT_ALLOWED.with_label_values(&[scope]).inc();

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}
