//! Edge-profile dedup store over a plain key/value backend.
//!
//! Edge KV stores (Workers KV and friends) have no atomic set-add and no
//! pub/sub. Race safety still holds: the visitor key itself is the
//! uniqueness gate — `put_if_absent("visitor:<uid>")` succeeds for exactly
//! one concurrent caller, and "new" is derived from whether the put landed.
//! The count scalar is a separate key, repaired from the cardinality of the
//! `visitor:` keyspace when missing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::{AddOutcome, DedupStore, StoreError};

const COUNT_KEY: &str = "count";
const VISITOR_PREFIX: &str = "visitor:";
const FINGERPRINT_PREFIX: &str = "fp:";

/// Minimal surface an edge key/value platform offers.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Write only if `key` is absent. Returns `true` when this call created
    /// the key. This is the only conditional primitive the dedup logic
    /// relies on.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Number of live keys under `prefix`. Used only for lazy count repair.
    async fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

pub struct KvDedupStore<B: KvBackend> {
    backend: B,
    /// Serializes the count read-modify-write within this process. Cross-node
    /// increments can still interleave; the membership keys stay correct and
    /// the repair path re-derives the true value.
    count_lock: Mutex<()>,
}

impl<B: KvBackend> KvDedupStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            count_lock: Mutex::new(()),
        }
    }

    /// The count scalar, or `None` when missing/unparsable.
    async fn read_scalar(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .backend
            .get(COUNT_KEY)
            .await?
            .and_then(|raw| raw.parse::<u64>().ok()))
    }

    async fn read_count(&self) -> Result<u64, StoreError> {
        if let Some(value) = self.read_scalar().await? {
            return Ok(value);
        }
        // Scalar missing or unparsable: repair from the visitor keyspace.
        let repaired = self.backend.count_prefix(VISITOR_PREFIX).await?;
        self.backend
            .put(COUNT_KEY, &repaired.to_string(), None)
            .await?;
        Ok(repaired)
    }
}

fn visitor_key(uid: &str) -> String {
    format!("{VISITOR_PREFIX}{uid}")
}

fn fingerprint_key(hash: &str) -> String {
    format!("{FINGERPRINT_PREFIX}{hash}")
}

#[async_trait]
impl<B: KvBackend> DedupStore for KvDedupStore<B> {
    async fn add_visitor(&self, uid: &str) -> Result<AddOutcome, StoreError> {
        let _guard = self.count_lock.lock().await;
        let is_new = self
            .backend
            .put_if_absent(&visitor_key(uid), "1", None)
            .await?;
        if is_new {
            let next = match self.read_scalar().await? {
                Some(current) => current + 1,
                // Scalar missing: the visitor keyspace already includes the
                // key this call just wrote, so its cardinality *is* the
                // post-add count.
                None => self.backend.count_prefix(VISITOR_PREFIX).await?,
            };
            self.backend.put(COUNT_KEY, &next.to_string(), None).await?;
            Ok(AddOutcome {
                is_new_member: true,
                count: next,
            })
        } else {
            Ok(AddOutcome {
                is_new_member: false,
                count: self.read_count().await?,
            })
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let _guard = self.count_lock.lock().await;
        self.read_count().await
    }

    async fn set_count(&self, value: u64) -> Result<(), StoreError> {
        let _guard = self.count_lock.lock().await;
        self.backend.put(COUNT_KEY, &value.to_string(), None).await
    }

    async fn lookup_fingerprint(&self, hash: &str) -> Result<Option<String>, StoreError> {
        self.backend.get(&fingerprint_key(hash)).await
    }

    async fn record_fingerprint(
        &self,
        hash: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        // put_if_absent doubles as the "only when no existing record" gate.
        self.backend
            .put_if_absent(&fingerprint_key(hash), uid, Some(ttl))
            .await?;
        Ok(())
    }

    /// No pub/sub on this profile; stream connections poll-and-diff instead.
    fn subscribe(&self) -> Option<broadcast::Receiver<u64>> {
        None
    }

    async fn publish(&self, _count: u64) -> Result<(), StoreError> {
        // Nothing to notify: propagation happens via the poll loop.
        Ok(())
    }
}

/// In-memory [`KvBackend`], for tests and single-node deployments.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, KvEntry>>,
}

struct KvEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Instant::now())
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.entries.lock().await.insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(KvEntry::is_live) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live())
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> KvDedupStore<MemoryKv> {
        KvDedupStore::new(MemoryKv::new())
    }

    #[tokio::test]
    async fn first_add_on_fresh_store_counts_once() {
        let store = store();
        let outcome = store.add_visitor("uid-a").await.unwrap();
        assert!(outcome.is_new_member);
        assert_eq!(outcome.count, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn add_with_missing_scalar_repairs_to_cardinality() {
        // Two visitors already in the keyspace but no count scalar (e.g. the
        // scalar key was evicted). The next add must land on 3, not 4.
        let kv = MemoryKv::new();
        kv.put("visitor:uid-a", "1", None).await.unwrap();
        kv.put("visitor:uid-b", "1", None).await.unwrap();

        let store = KvDedupStore::new(kv);
        let outcome = store.add_visitor("uid-c").await.unwrap();
        assert!(outcome.is_new_member);
        assert_eq!(outcome.count, 3);
    }

    #[tokio::test]
    async fn put_if_absent_gates_duplicate_adds() {
        let store = store();
        assert!(store.add_visitor("uid-a").await.unwrap().is_new_member);
        let repeat = store.add_visitor("uid-a").await.unwrap();
        assert!(!repeat.is_new_member);
        assert_eq!(repeat.count, 1);
    }

    #[tokio::test]
    async fn concurrent_adds_of_same_uid_yield_one_new_member() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add_visitor("racing-uid").await.unwrap()
            }));
        }

        let mut new_members = 0;
        for handle in handles {
            if handle.await.unwrap().is_new_member {
                new_members += 1;
            }
        }
        assert_eq!(new_members, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_count_scalar_is_repaired_from_visitor_keys() {
        let kv = MemoryKv::new();
        kv.put("visitor:uid-a", "1", None).await.unwrap();
        kv.put("visitor:uid-b", "1", None).await.unwrap();
        kv.put("fp:somehash", "uid-a", None).await.unwrap();

        let store = KvDedupStore::new(kv);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recorded_fingerprint_is_not_overwritten() {
        let store = store();
        store
            .record_fingerprint("hash-1", "uid-a", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .record_fingerprint("hash-1", "uid-b", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.lookup_fingerprint("hash-1").await.unwrap().as_deref(),
            Some("uid-a")
        );
    }

    #[tokio::test]
    async fn expired_fingerprint_lookup_misses() {
        let store = store();
        store
            .record_fingerprint("hash-1", "uid-a", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.lookup_fingerprint("hash-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_subscription_on_kv_profile() {
        assert!(store().subscribe().is_none());
    }
}
