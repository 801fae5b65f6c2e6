use chrono::Utc;

// Source of "now" for window math, in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // pre-1970 clocks clamp to zero
        Utc::now().timestamp_millis().max(0) as u64
    }
}

#[cfg(test)]
pub use manual::ManualClock;
