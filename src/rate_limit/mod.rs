//! Fixed-window request limiting keyed by client identity.
//!
//! Each key gets a window of `window_ms` starting at its first request. Every
//! request inside the window bumps the counter, rejected ones included, and
//! the key is over the limit once the counter passes `max_requests`. The only
//! way back is the window rolling over.

pub mod clock;
pub mod store;
pub mod sweeper;

use std::sync::Arc;

use crate::config::ConfigError;
pub use clock::{Clock, SystemClock};
pub use store::{MemoryStore, RateLimitStore};

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Limit applied to one scope of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_requests: u32,
    window_ms: u64,
}

impl RateLimitConfig {
    /// Zero for either value is a configuration mistake, not a policy.
    /// Windows are whole seconds so `Retry-After` never outlasts the window.
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if window_ms % 1000 != 0 {
            return Err(ConfigError::FractionalWindow(window_ms));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Whole seconds until the window resets, only set on rejection.
    pub retry_after: Option<u64>,
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    // Process-local counters on the wall clock
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    /// Count one request for `key` and decide whether it may go through.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let entry = self.store.hit(key, now, config.window_ms);
        let limit = config.max_requests;

        if entry.count > limit {
            // entry is live here, so reset_at_ms > now and this is >= 1
            let retry_after = (entry.reset_at_ms - now).div_ceil(1000);
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                retry_after: Some(retry_after),
            };
        }

        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(entry.count),
            retry_after: None,
        }
    }

    pub fn sweep(&self) -> usize {
        self.store.sweep_expired(self.clock.now_ms())
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}
