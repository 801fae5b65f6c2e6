use std::sync::Arc;
use tokio::time::{Duration, interval};

use crate::metrics::{RATE_LIMIT_SWEPT, RATE_LIMIT_TRACKED_KEYS};
use super::RateLimiter;

// One sweep pass, returns evicted entry count
pub fn sweep_once(limiter: &RateLimiter) -> usize {
    let removed = limiter.sweep();
    let tracked = limiter.tracked_keys();

    RATE_LIMIT_SWEPT.inc_by(removed as f64);
    RATE_LIMIT_TRACKED_KEYS.set(tracked as f64);

    if removed > 0 {
        tracing::debug!(removed, tracked, "swept expired rate limit windows");
    }
    removed
}

// Expiry sweeper - runs on a fixed interval for the life of the process
pub async fn expiry_sweeper(limiter: Arc<RateLimiter>, sweep_interval: Duration) {
    let mut interval = interval(sweep_interval);

    tracing::info!(interval = ?sweep_interval, "rate limit sweeper started");

    loop {
        interval.tick().await;
        sweep_once(&limiter);
    }
}
