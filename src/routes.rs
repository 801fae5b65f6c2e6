use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{health_handler, metrics_handler, proxy_handler};
use crate::middleware::enforce_rate_limit;
use crate::state::AppState;

// Gateway routes. /health and /metrics are served locally and never
// limited; everything else is rate limited then proxied to the app.
pub fn build_router(state: Arc<AppState>) -> Router {
    let proxied = Router::new()
        .fallback(proxy_handler)
        .layer(from_fn_with_state(state.rate_limit.clone(), enforce_rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(proxied)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutePolicies;
    use crate::load_balancer::LoadBalancer;
    use crate::middleware::RateLimitGuard;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use axum::body::{Body, to_bytes};
    use axum::extract::{RawQuery, Request};
    use axum::http::{HeaderMap, Method, StatusCode};
    use axum::routing::post;
    use tower::ServiceExt;

    // Stand-in for the app: echoes what it was sent
    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route(
                "/api/teams",
                get(|headers: HeaderMap, RawQuery(query): RawQuery| async move {
                    let ip = headers
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-")
                        .to_string();
                    format!("teams ip={ip} query={}", query.unwrap_or_default())
                }),
            )
            .route("/api/notifications", post(|body: String| async move { body }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    fn gateway(backends: &str, max_requests: u32) -> (Router, Arc<AppState>) {
        let policies = RoutePolicies::new(RateLimitConfig::new(max_requests, 60_000).unwrap());
        let state = Arc::new(AppState {
            client: reqwest::Client::new(),
            load_balancer: Arc::new(LoadBalancer::new(backends).unwrap()),
            rate_limit: RateLimitGuard::new(Arc::new(RateLimiter::in_memory()), policies),
            max_body_bytes: 64,
        });
        (build_router(state.clone()), state)
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn forwards_to_upstream_with_limit_headers() {
        let upstream = spawn_upstream().await;
        let (app, _) = gateway(&upstream, 5);

        let response = app
            .oneshot(request(Method::GET, "/api/teams?league=7", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        assert_eq!(body_text(response).await, "teams ip=1.2.3.4 query=league=7");
    }

    #[tokio::test]
    async fn forwards_request_body() {
        let upstream = spawn_upstream().await;
        let (app, _) = gateway(&upstream, 5);

        let response = app
            .oneshot(request(Method::POST, "/api/notifications", "{\"title\":\"Kickoff\"}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "{\"title\":\"Kickoff\"}");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let upstream = spawn_upstream().await;
        let (app, _) = gateway(&upstream, 5);

        let big = "x".repeat(65).leak();
        let response = app
            .oneshot(request(Method::POST, "/api/notifications", big))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_forwarded() {
        let (app, state) = gateway("127.0.0.1:9", 1);
        // never reachable; a forwarded request would come back 502
        state.load_balancer.all_backends()[0].set_healthy(false);

        let first = app.clone().oneshot(request(Method::GET, "/api/teams", "")).await.unwrap();
        assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);

        let second = app.oneshot(request(Method::GET, "/api/teams", "")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn operational_endpoints_are_not_limited() {
        let (app, _) = gateway("127.0.0.1:9", 1);

        for _ in 0..3 {
            let response = app.clone().oneshot(request(Method::GET, "/health", "")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key("x-ratelimit-limit"));
        }

        let health = app.clone().oneshot(request(Method::GET, "/health", "")).await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(health).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backends"]["total"], 1);

        let metrics = app.oneshot(request(Method::GET, "/metrics", "")).await.unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn transport_failure_marks_backend_unhealthy() {
        // bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (app, state) = gateway(&format!("127.0.0.1:{port}"), 5);
        let response = app.oneshot(request(Method::GET, "/api/teams", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(state.load_balancer.healthy_count(), 0);
    }
}
