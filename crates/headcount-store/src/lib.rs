//! Authoritative visitor-dedup storage and its process-local companions.
//!
//! The one invariant the whole crate exists for: adding the same uid twice
//! must report "already present" the second time and must not change the
//! count, even under concurrent calls from independent nodes.

pub mod cache;
pub mod error;
pub mod fallback;
pub mod kv;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

pub use cache::CountCache;
pub use error::StoreError;
pub use fallback::FallbackCounter;

/// Result of an [`DedupStore::add_visitor`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// `true` for exactly one caller per distinct uid, ever.
    pub is_new_member: bool,
    /// The persisted count as of this call's ordering.
    pub count: u64,
}

/// Where a reported count came from, so operators can spot degraded mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountSource {
    Authoritative,
    Cache,
    Fallback,
}

/// A point-in-time view of the visitor count. Derived, never stored.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountSnapshot {
    pub value: u64,
    pub source: CountSource,
}

/// Storage interface for visitor dedup and count persistence.
///
/// The default deployment uses [`memory::MemoryStore`]. Edge deployments use
/// [`kv::KvDedupStore`] over a platform key/value store, and networked
/// deployments can swap in the Redis backend, all while route handlers stay
/// unchanged.
#[async_trait]
pub trait DedupStore: Send + Sync + 'static {
    /// Record `uid` as seen. Atomic: concurrent calls with the same uid
    /// yield `is_new_member = true` for at most one caller, and the returned
    /// count reflects that exact ordering.
    async fn add_visitor(&self, uid: &str) -> Result<AddOutcome, StoreError>;

    /// The persisted count. A missing scalar is recomputed from the
    /// membership set's cardinality and written back (lazy self-healing).
    async fn count(&self) -> Result<u64, StoreError>;

    /// Administrative override of the persisted count.
    async fn set_count(&self, value: u64) -> Result<(), StoreError>;

    /// Resolve a fingerprint hash to the uid recorded for it, if any
    /// unexpired record exists.
    async fn lookup_fingerprint(&self, hash: &str) -> Result<Option<String>, StoreError>;

    /// Bind `hash` to `uid` for `ttl`. Only called after a missed lookup;
    /// an existing unexpired record is left in place.
    async fn record_fingerprint(
        &self,
        hash: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// A live feed of count changes, when the backend has real pub/sub.
    /// `None` tells the stream layer to fall back to poll-and-diff.
    fn subscribe(&self) -> Option<broadcast::Receiver<u64>>;

    /// Announce a new count to subscribers. Best effort.
    async fn publish(&self, count: u64) -> Result<(), StoreError>;
}
