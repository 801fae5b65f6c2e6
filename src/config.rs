use clap::Parser;
use std::time::Duration;
use thiserror::Error;

use crate::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS, RateLimitConfig};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "pitchconnect-gateway")]
#[command(about = "Rate limiting edge gateway for the PitchConnect app")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Upstream app instances (comma-separated)
    // Example: "localhost:3000,localhost:3001"
    #[arg(short, long, default_value = "localhost:3000")]
    pub backends: String,

    // Rate limit max requests per window
    #[arg(long, default_value_t = DEFAULT_MAX_REQUESTS)]
    pub rate_limit: u32,

    // Rate limit window in milliseconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_MS)]
    pub rate_window_ms: u64,

    // Per-route override, PREFIX=MAX[@WINDOW_MS] or PREFIX=@WINDOW_MS
    // Example: "/api/auth=5@60000"
    #[arg(long = "route-limit", value_parser = parse_route_override)]
    pub route_limits: Vec<RouteOverride>,

    // Seconds between sweeps of expired rate limit windows
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,

    // Health check interval in seconds
    #[arg(long, default_value_t = 30)]
    pub health_interval: u64,

    // Upstream health endpoint
    #[arg(long, default_value = "/api/health")]
    pub health_path: String,

    // Largest request body forwarded upstream
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max requests per window must be at least 1")]
    ZeroMaxRequests,
    #[error("rate limit window must be at least 1000ms")]
    ZeroWindow,
    #[error("rate limit window must be whole seconds, got {0}ms")]
    FractionalWindow(u64),
    #[error("sweep interval must be at least 1s")]
    ZeroSweepInterval,
    #[error("health check interval must be at least 1s")]
    ZeroHealthInterval,
    #[error("at least one backend required")]
    NoBackends,
    #[error("route limit for {prefix}: {source}")]
    Route {
        prefix: String,
        source: Box<ConfigError>,
    },
}

impl Args {
    pub fn sweep_interval(&self) -> Result<Duration, ConfigError> {
        match self.sweep_interval {
            0 => Err(ConfigError::ZeroSweepInterval),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn health_interval(&self) -> Result<Duration, ConfigError> {
        match self.health_interval {
            0 => Err(ConfigError::ZeroHealthInterval),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}

// Route-level override; unset fields inherit the defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOverride {
    pub prefix: String,
    pub max_requests: Option<u32>,
    pub window_ms: Option<u64>,
}

pub fn parse_route_override(raw: &str) -> Result<RouteOverride, String> {
    let (prefix, limits) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PREFIX=MAX[@WINDOW_MS], got {raw:?}"))?;

    let prefix = prefix.trim();
    if !prefix.starts_with('/') {
        return Err(format!("route prefix must start with '/', got {prefix:?}"));
    }

    let (max, window) = match limits.split_once('@') {
        Some((max, window)) => (max.trim(), Some(window.trim())),
        None => (limits.trim(), None),
    };

    let max_requests = match max {
        "" => None,
        v => Some(v.parse::<u32>().map_err(|e| format!("bad max requests {v:?}: {e}"))?),
    };
    let window_ms = match window {
        None | Some("") => None,
        Some(v) => Some(v.parse::<u64>().map_err(|e| format!("bad window {v:?}: {e}"))?),
    };

    if max_requests.is_none() && window_ms.is_none() {
        return Err(format!("route limit for {prefix} sets nothing"));
    }

    Ok(RouteOverride {
        prefix: prefix.to_string(),
        max_requests,
        window_ms,
    })
}

pub const DEFAULT_SCOPE: &str = "default";

/// Which limit applies to which path.
///
/// The longest matching route prefix wins. Prefixes match on segment
/// boundaries, so `/api/auth` covers `/api/auth/login` but not `/api/authors`.
/// Paths are normalized before matching, so `/api//auth` and `/api/./auth`
/// land in the same scope as `/api/auth`.
#[derive(Debug, Clone)]
pub struct RoutePolicies {
    default: RateLimitConfig,
    routes: Vec<(String, RateLimitConfig)>,
}

impl RoutePolicies {
    pub fn new(default: RateLimitConfig) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let default = RateLimitConfig::new(args.rate_limit, args.rate_window_ms)?;
        let mut policies = Self::new(default);
        for route in &args.route_limits {
            policies = policies.with_override(route)?;
        }
        Ok(policies)
    }

    pub fn with_override(mut self, route: &RouteOverride) -> Result<Self, ConfigError> {
        let config = RateLimitConfig::new(
            route.max_requests.unwrap_or(self.default.max_requests()),
            route.window_ms.unwrap_or(self.default.window_ms()),
        )
        .map_err(|e| ConfigError::Route {
            prefix: route.prefix.clone(),
            source: Box::new(e),
        })?;

        let prefix = normalize_path(&route.prefix).trim_end_matches('/').to_string();
        self.routes.retain(|(p, _)| *p != prefix);
        self.routes.push((prefix, config));
        // longest prefix first
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(self)
    }

    /// Scope name and limit for `path`.
    pub fn resolve(&self, path: &str) -> (&str, RateLimitConfig) {
        let path = normalize_path(path);
        self.routes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, &path))
            .map(|(prefix, config)| (prefix.as_str(), *config))
            .unwrap_or((DEFAULT_SCOPE, self.default))
    }
}

// Canonical form of a request path as the app's router would see it:
// percent-escapes decoded, empty and "." segments dropped, ".." popped
pub fn normalize_path(path: &str) -> String {
    let decoded = percent_decode(path);
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
