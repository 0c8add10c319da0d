//! In-process store with native set semantics and pub/sub.
//!
//! Stands in for the networked KV+set backend profile: atomic set-add comes
//! for free from holding the mutex across the insert-and-count, and pub/sub
//! is a `tokio::sync::broadcast` channel. Also the default and test backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::{AddOutcome, DedupStore, StoreError};

const BROADCAST_CAPACITY: usize = 32;

#[derive(Default)]
struct Inner {
    visitors: HashSet<String>,
    /// Persisted count scalar. `None` models the scalar going missing; it is
    /// repaired from `visitors.len()` on the next read.
    count: Option<u64>,
    fingerprints: HashMap<String, FingerprintRecord>,
}

struct FingerprintRecord {
    uid: String,
    expires_at: Instant,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<u64>,
    /// Failure injection: when set, every operation reports
    /// [`StoreError::Unavailable`] so the degraded path can be exercised.
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            tx,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate a storage outage (or recovery). Used by operators' smoke
    /// tests and the integration suite; a no-op in normal operation.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store forced offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn add_visitor(&self, uid: &str) -> Result<AddOutcome, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock().await;
        if inner.visitors.insert(uid.to_string()) {
            let next = match inner.count {
                Some(current) => current + 1,
                // Scalar was missing: the set already includes the new uid.
                None => inner.visitors.len() as u64,
            };
            inner.count = Some(next);
            Ok(AddOutcome {
                is_new_member: true,
                count: next,
            })
        } else {
            let current = match inner.count {
                Some(current) => current,
                None => {
                    let repaired = inner.visitors.len() as u64;
                    inner.count = Some(repaired);
                    repaired
                }
            };
            Ok(AddOutcome {
                is_new_member: false,
                count: current,
            })
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock().await;
        match inner.count {
            Some(current) => Ok(current),
            None => {
                let repaired = inner.visitors.len() as u64;
                inner.count = Some(repaired);
                Ok(repaired)
            }
        }
    }

    async fn set_count(&self, value: u64) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner.lock().await.count = Some(value);
        Ok(())
    }

    async fn lookup_fingerprint(&self, hash: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.lock().await;
        match inner.fingerprints.get(hash) {
            Some(record) if record.expires_at > Instant::now() => Ok(Some(record.uid.clone())),
            Some(_) => {
                // Expired: drop it so the map does not accumulate stale rows.
                inner.fingerprints.remove(hash);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn record_fingerprint(
        &self,
        hash: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner.lock().await.fingerprints.insert(
            hash.to_string(),
            FingerprintRecord {
                uid: uid.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<u64>> {
        Some(self.tx.subscribe())
    }

    async fn publish(&self, count: u64) -> Result<(), StoreError> {
        // send() errors only when no receiver is connected, which is not a
        // failure for a best-effort announcement.
        let _ = self.tx.send(count);
        Ok(())
    }
}
