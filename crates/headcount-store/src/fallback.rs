//! Degraded single-process counter, used only while the authoritative store
//! is unreachable.
//!
//! Guarantees are explicitly weaker than the primary path: correct within
//! one process only, reset on restart, never synchronized with other nodes,
//! and never merged back into the authoritative total when the store
//! recovers. Responses built from it carry `source: "fallback"` so the
//! degradation is visible to operators.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct FallbackCounter {
    inner: Mutex<FallbackInner>,
}

#[derive(Default)]
struct FallbackInner {
    seen: HashSet<String>,
    count: u64,
}

impl FallbackCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit. Same idempotence contract as the primary path, scoped
    /// to this process: a uid increments the count at most once.
    pub fn record(&self, uid: &str) -> u64 {
        let mut inner = self.inner.lock().expect("fallback counter mutex poisoned");
        if inner.seen.insert(uid.to_string()) {
            inner.count += 1;
        }
        inner.count
    }

    pub fn count(&self) -> u64 {
        self.inner
            .lock()
            .expect("fallback counter mutex poisoned")
            .count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_uids_increment() {
        let counter = FallbackCounter::new();
        assert_eq!(counter.record("a"), 1);
        assert_eq!(counter.record("b"), 2);
        assert_eq!(counter.record("c"), 3);
    }

    #[test]
    fn repeat_uid_does_not_increment() {
        let counter = FallbackCounter::new();
        counter.record("a");
        assert_eq!(counter.record("a"), 1);
        assert_eq!(counter.count(), 1);
    }
}
