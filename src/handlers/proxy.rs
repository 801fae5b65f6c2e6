use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;
use std::time::Instant;

use crate::error::GatewayError;
use crate::metrics::{REQUEST_TOTAL, UPSTREAM_LATENCY};
use crate::state::AppState;

// Connection-scoped headers, never forwarded in either direction
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "host",
    "content-length",
];

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}

// Forward the request to the next healthy app instance
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, GatewayError> {
    REQUEST_TOTAL.inc();

    let backend = state
        .load_balancer
        .get_backend()
        .ok_or(GatewayError::NoHealthyBackend)?;

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge(state.max_body_bytes))?;

    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("{}{}", backend.url, path_and_query);
    tracing::debug!(method = %parts.method, %url, "forwarding");

    let start_time = Instant::now();
    let result = state
        .client
        .request(parts.method, url.as_str())
        .headers(forwardable_headers(&parts.headers))
        .body(body)
        .send()
        .await;

    let upstream = match result {
        Ok(res) => res,
        // Marking backend as unhealthy on transport error
        Err(e) => {
            backend.set_healthy(false);
            tracing::warn!(backend = %backend.url, "backend failed, marked unhealthy");
            return Err(GatewayError::Upstream {
                backend: backend.url.clone(),
                reason: e.to_string(),
            });
        }
    };

    let status = upstream.status();
    let headers = forwardable_headers(upstream.headers());
    let bytes = upstream.bytes().await.map_err(|e| GatewayError::Upstream {
        backend: backend.url.clone(),
        reason: e.to_string(),
    })?;

    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
