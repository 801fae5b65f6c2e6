use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of proxied requests").unwrap();
    pub static ref RATE_LIMIT_ALLOWED: CounterVec = register_counter_vec!(
        "gateway_rate_limit_allowed_total",
        "Requests let through by the rate limiter",
        &["scope"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_REJECTED: CounterVec = register_counter_vec!(
        "gateway_rate_limit_rejected_total",
        "Requests rejected with 429",
        &["scope"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_TRACKED_KEYS: Gauge =
        register_gauge!("gateway_rate_limit_tracked_keys", "Rate limit windows currently held").unwrap();
    pub static ref RATE_LIMIT_SWEPT: Counter =
        register_counter!("gateway_rate_limit_swept_total", "Expired windows removed by the sweeper").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "gateway_upstream_latency_seconds",
        "Upstream round trip in seconds"
    )
    .unwrap();
    pub static ref HEALTHY_BACKENDS: Gauge =
        register_gauge!("gateway_healthy_backends", "Upstream instances passing health checks").unwrap();
}
