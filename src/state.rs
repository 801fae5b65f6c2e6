use std::sync::Arc;

use crate::load_balancer::LoadBalancer;
use crate::middleware::RateLimitGuard;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub load_balancer: Arc<LoadBalancer>,
    pub rate_limit: RateLimitGuard,
    pub max_body_bytes: usize, // largest body buffered for upstream
}
