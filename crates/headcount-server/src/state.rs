use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use headcount_core::config::Config;
use headcount_core::fingerprint::FINGERPRINT_TTL;
use headcount_store::{
    CountCache, CountSnapshot, CountSource, DedupStore, FallbackCounter, StoreError,
};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// Constructed once at process start; the count cache and fallback counter
/// deliberately live here (not in module globals) so their process-local,
/// not-cross-node lifecycle is an explicit contract.
pub struct AppState {
    pub store: Arc<dyn DedupStore>,
    pub config: Arc<Config>,

    /// Short-TTL shield in front of the store. Refreshed synchronously after
    /// every counting write, so this node reads its own writes.
    pub count_cache: CountCache,

    /// Degraded in-process counter, consulted only while the store is
    /// unreachable.
    pub fallback: FallbackCounter,
}

impl AppState {
    pub fn new(store: Arc<dyn DedupStore>, config: Config) -> Self {
        let count_cache = CountCache::new(config.count_cache_ttl());
        Self {
            store,
            config: Arc::new(config),
            count_cache,
            fallback: FallbackCounter::new(),
        }
    }

    /// Bound a store call so a hung backend degrades to fallback counting
    /// instead of hanging the request.
    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.store_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable("store call timed out".into())),
        }
    }

    /// Best-known current count: cache, then store (repopulating the cache),
    /// then fallback. Never errors — visitor endpoints must answer 200 even
    /// mid-outage.
    pub async fn current_count(&self) -> CountSnapshot {
        if let Some(value) = self.count_cache.get() {
            return CountSnapshot {
                value,
                source: CountSource::Cache,
            };
        }
        match self.with_timeout(self.store.count()).await {
            Ok(value) => {
                self.count_cache.set(value);
                CountSnapshot {
                    value,
                    source: CountSource::Authoritative,
                }
            }
            Err(e) => {
                warn!(error = %e, "Count read failed; serving fallback count");
                CountSnapshot {
                    value: self.fallback.count(),
                    source: CountSource::Fallback,
                }
            }
        }
    }

    /// Record a visit for `uid` and return the resulting count.
    ///
    /// On a counting write the cache is refreshed in the same request and
    /// subscribers are notified; a publish failure is logged and otherwise
    /// ignored. A store outage switches this request to the fallback
    /// counter.
    pub async fn record_visit(&self, uid: &str) -> CountSnapshot {
        match self.with_timeout(self.store.add_visitor(uid)).await {
            Ok(outcome) => {
                if outcome.is_new_member {
                    self.count_cache.set(outcome.count);
                    // Same bound as every other store call: a stalled
                    // notification must not hang the visit response.
                    if let Err(e) = self.with_timeout(self.store.publish(outcome.count)).await {
                        warn!(error = %e, "Count-change notification failed");
                    }
                }
                CountSnapshot {
                    value: outcome.count,
                    source: CountSource::Authoritative,
                }
            }
            Err(e) => {
                warn!(error = %e, uid, "Store unavailable; counting in fallback mode");
                CountSnapshot {
                    value: self.fallback.record(uid),
                    source: CountSource::Fallback,
                }
            }
        }
    }

    /// Merge a freshly minted uid against the fingerprint index.
    ///
    /// A hit means this browser was seen before and lost its cookie: the
    /// fingerprint's uid wins over the minted one, so the visit dedups to
    /// the original identity. A miss records the minted uid for the 48-hour
    /// window. Index trouble never fails the request — the minted uid is
    /// simply used as-is.
    pub async fn reconcile_fingerprint(&self, hash: &str, minted_uid: &str) -> String {
        match self.with_timeout(self.store.lookup_fingerprint(hash)).await {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                if let Err(e) = self
                    .with_timeout(
                        self.store
                            .record_fingerprint(hash, minted_uid, FINGERPRINT_TTL),
                    )
                    .await
                {
                    warn!(error = %e, "Failed to record fingerprint");
                }
                minted_uid.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Fingerprint lookup failed; using minted uid");
                minted_uid.to_string()
            }
        }
    }
}
