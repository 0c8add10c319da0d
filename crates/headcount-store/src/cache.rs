//! Process-local, short-TTL count cache.
//!
//! Shields the authoritative store from read amplification and gives the
//! node that just incremented the count read-your-writes: a successful
//! new-member add refreshes this cache synchronously in the same request,
//! so a stale backend read cannot roll the node's own view backwards.
//! Never a source of truth across processes.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct CountCache {
    slot: Mutex<Option<CachedCount>>,
    ttl: Duration,
}

struct CachedCount {
    value: u64,
    expires_at: Instant,
}

impl CountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    /// The cached count, or `None` on miss/expiry (caller re-reads the store
    /// and repopulates via [`set`](Self::set)).
    pub fn get(&self) -> Option<u64> {
        let mut slot = self.slot.lock().expect("count cache mutex poisoned");
        match slot.as_ref() {
            Some(cached) if cached.expires_at > Instant::now() => Some(cached.value),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    /// Replace the cached value wholesale and restart the TTL clock.
    pub fn set(&self, value: u64) {
        let mut slot = self.slot.lock().expect("count cache mutex poisoned");
        *slot = Some(CachedCount {
            value,
            expires_at: Instant::now() + self.ttl,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cache_misses() {
        let cache = CountCache::new(Duration::from_secs(5));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn set_then_get_within_ttl() {
        let cache = CountCache::new(Duration::from_secs(5));
        cache.set(42);
        assert_eq!(cache.get(), Some(42));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = CountCache::new(Duration::ZERO);
        cache.set(42);
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn set_replaces_wholesale() {
        let cache = CountCache::new(Duration::from_secs(5));
        cache.set(1);
        cache.set(2);
        assert_eq!(cache.get(), Some(2));
    }
}
