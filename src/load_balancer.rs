use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::{Duration, interval};

use crate::config::ConfigError;
use crate::metrics::HEALTHY_BACKENDS;

// Single upstream app instance
pub struct Backend {
    pub url: String,
    healthy: AtomicBool,
}

impl Backend {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Load balancer over the upstream instances
pub struct LoadBalancer {
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

impl LoadBalancer {
    // Create from comma-separated urls "localhost:3000, localhost:3001"
    pub fn new(backends_str: &str) -> Result<Self, ConfigError> {
        let backends: Vec<Arc<Backend>> = backends_str
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|url| {
                // add http:// if not present
                let full_url = if url.starts_with("http://") || url.starts_with("https://") {
                    url.trim_end_matches('/').to_string()
                } else {
                    format!("http://{}", url.trim_end_matches('/'))
                };
                Arc::new(Backend::new(full_url))
            })
            .collect();
        if backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        tracing::info!("load balancer initialized with {} backends", backends.len());
        for (i, b) in backends.iter().enumerate() {
            tracing::info!("  [{}] {}", i + 1, b.url);
        }
        HEALTHY_BACKENDS.set(backends.len() as f64);

        Ok(Self {
            backends,
            current: AtomicUsize::new(0),
        })
    }

    // Get next healthy backend (round-robin)
    pub fn get_backend(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        (0..len)
            .map(|i| &self.backends[(start + i) % len])
            .find(|b| b.is_healthy())
            .cloned()
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy()).count()
    }
}

// One health pass over every backend, returns how many are healthy
pub async fn check_backends(
    load_balancer: &LoadBalancer,
    client: &reqwest::Client,
    health_path: &str,
) -> usize {
    for backend in load_balancer.all_backends() {
        let url = format!("{}{}", backend.url, health_path);
        let was_healthy = backend.is_healthy();

        let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(res) => res.status().is_success(),
            Err(_) => false,
        };
        backend.set_healthy(is_healthy);

        // Log status changes
        if was_healthy != is_healthy {
            if is_healthy {
                tracing::info!(backend = %backend.url, "backend is now healthy");
            } else {
                tracing::warn!(backend = %backend.url, "backend is now unhealthy");
            }
        }
    }

    let healthy = load_balancer.healthy_count();
    HEALTHY_BACKENDS.set(healthy as f64);
    healthy
}

// Health check loop - one pass per tick, brings failed backends back
pub async fn health_checker(
    load_balancer: Arc<LoadBalancer>,
    client: reqwest::Client,
    check_interval: Duration,
    health_path: String,
) {
    let mut interval = interval(check_interval);

    tracing::info!(interval = ?check_interval, path = %health_path, "health checker started");

    loop {
        interval.tick().await;
        check_backends(&load_balancer, &client, &health_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_list() {
        let lb = LoadBalancer::new(" localhost:3000, https://app.example.com/ ,,").unwrap();
        let urls: Vec<_> = lb.all_backends().iter().map(|b| b.url.as_str()).collect();
        assert_eq!(urls, ["http://localhost:3000", "https://app.example.com"]);
    }

    #[test]
    fn empty_backend_list_is_config_error() {
        assert!(matches!(LoadBalancer::new(" , "), Err(ConfigError::NoBackends)));
    }

    #[test]
    fn round_robin_skips_unhealthy() {
        let lb = LoadBalancer::new("a:1,b:2,c:3").unwrap();
        lb.all_backends()[1].set_healthy(false);

        let picked: Vec<_> = (0..4).map(|_| lb.get_backend().unwrap().url.clone()).collect();
        assert_eq!(picked, ["http://a:1", "http://c:3", "http://c:3", "http://a:1"]);
        assert_eq!(lb.healthy_count(), 2);
    }

    // Stand-in app instance: healthy on /api/health, 404 elsewhere
    async fn spawn_app() -> String {
        let app = axum::Router::new().route("/api/health", axum::routing::get(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    #[tokio::test]
    async fn health_pass_restores_failed_backend() {
        let lb = LoadBalancer::new(&spawn_app().await).unwrap();
        lb.all_backends()[0].set_healthy(false);

        let healthy = check_backends(&lb, &reqwest::Client::new(), "/api/health").await;
        assert_eq!(healthy, 1);
        assert!(lb.all_backends()[0].is_healthy());
        assert!(lb.get_backend().is_some());
    }

    #[tokio::test]
    async fn non_success_status_marks_backend_unhealthy() {
        let lb = LoadBalancer::new(&spawn_app().await).unwrap();

        let healthy = check_backends(&lb, &reqwest::Client::new(), "/missing").await;
        assert_eq!(healthy, 0);
        assert!(!lb.all_backends()[0].is_healthy());
    }

    #[tokio::test]
    async fn unreachable_backend_is_unhealthy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let lb = LoadBalancer::new(&format!("127.0.0.1:{port}")).unwrap();
        assert_eq!(check_backends(&lb, &reqwest::Client::new(), "/api/health").await, 0);
    }

    #[tokio::test]
    async fn background_checker_runs_first_pass_immediately() {
        let lb = Arc::new(LoadBalancer::new(&spawn_app().await).unwrap());
        lb.all_backends()[0].set_healthy(false);

        let task = tokio::spawn(health_checker(
            lb.clone(),
            reqwest::Client::new(),
            Duration::from_secs(3600),
            "/api/health".to_string(),
        ));

        // first tick fires at once, then the loop parks for an hour
        for _ in 0..100 {
            if lb.all_backends()[0].is_healthy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        task.abort();
        assert!(lb.all_backends()[0].is_healthy());
    }

    #[test]
    fn none_when_all_unhealthy() {
        let lb = LoadBalancer::new("a:1").unwrap();
        lb.all_backends()[0].set_healthy(false);
        assert!(lb.get_backend().is_none());
    }
}
