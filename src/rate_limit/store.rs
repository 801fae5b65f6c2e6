use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

// Rate limit entry - one per key, tracks the current fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at_ms: u64, // window end, ms since epoch
}

impl RateLimitEntry {
    pub fn fresh(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at_ms: now_ms.saturating_add(window_ms),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.reset_at_ms <= now_ms
    }
}

/// Where the counters live.
///
/// `hit` must be atomic per key: two concurrent hits on the same key always
/// observe each other. The in-process [`MemoryStore`] gets this from the
/// shard lock; a shared cache backend would use INCR + EXPIRE.
pub trait RateLimitStore: Send + Sync {
    /// Record one request for `key` and return the entry as it stands after it.
    /// Opens a new window when the key is unseen or its window has passed.
    fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimitEntry;

    /// Drop every entry whose window has passed. Returns how many went.
    fn sweep_expired(&self, now_ms: u64) -> usize;

    fn len(&self) -> usize;
}

// Process-local store, key -> entry
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }
}

impl RateLimitStore for MemoryStore {
    fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimitEntry {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                // window rolled over? start again
                if entry.is_expired(now_ms) {
                    *entry = RateLimitEntry::fresh(now_ms, window_ms);
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
                *entry
            }
            Entry::Vacant(vacant) => *vacant.insert(RateLimitEntry::fresh(now_ms, window_ms)),
        }
    }

    fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now_ms);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
