//! Redis-backed dedup store: the networked KV+set profile.
//!
//! Membership uses `SADD` (atomic, returns whether the member was new), the
//! count scalar uses `INCR`, fingerprints use `SET NX EX`, and count-change
//! notifications ride Redis pub/sub, bridged into an in-process broadcast
//! channel by a forwarder task spawned at connect time.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::broadcast;
use tracing::warn;

use crate::{AddOutcome, DedupStore, StoreError};

const VISITOR_SET: &str = "ea:visitors";
const COUNT_KEY: &str = "ea:count";
const CHANNEL: &str = "ea:count-updates";
const BROADCAST_CAPACITY: usize = 32;

fn fingerprint_key(hash: &str) -> String {
    format!("ea:fp:{hash}")
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

pub struct RedisStore {
    conn: ConnectionManager,
    tx: broadcast::Sender<u64>,
}

impl RedisStore {
    /// Connect and spawn the pub/sub forwarder.
    ///
    /// The forwarder owns its own connection (pub/sub puts a Redis
    /// connection into subscriber mode, unusable for commands) and runs
    /// until that connection drops. Stream clients then stop receiving live
    /// updates until the process restarts; counts themselves are unaffected.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(unavailable)?;

        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let mut pubsub = client.get_async_pubsub().await.map_err(unavailable)?;
        pubsub.subscribe(CHANNEL).await.map_err(unavailable)?;

        let forward_tx = tx.clone();
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<u64>() {
                    Ok(count) => {
                        let _ = forward_tx.send(count);
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed count-update payload"),
                }
            }
            warn!("Redis pub/sub connection closed; live updates stopped");
        });

        Ok(Self { conn, tx })
    }
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn add_visitor(&self, uid: &str) -> Result<AddOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(VISITOR_SET, uid).await.map_err(unavailable)?;
        if added == 1 {
            // INCR is atomic, so the returned value reflects this call's
            // exact position in the increment order.
            let count: u64 = conn.incr(COUNT_KEY, 1u64).await.map_err(unavailable)?;
            Ok(AddOutcome {
                is_new_member: true,
                count,
            })
        } else {
            Ok(AddOutcome {
                is_new_member: false,
                count: self.count().await?,
            })
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        match conn
            .get::<_, Option<u64>>(COUNT_KEY)
            .await
            .map_err(unavailable)?
        {
            Some(count) => Ok(count),
            None => {
                // Scalar missing: repair from the set's cardinality.
                let repaired: u64 = conn.scard(VISITOR_SET).await.map_err(unavailable)?;
                let _: () = conn
                    .set(COUNT_KEY, repaired)
                    .await
                    .map_err(unavailable)?;
                Ok(repaired)
            }
        }
    }

    async fn set_count(&self, value: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(COUNT_KEY, value).await.map_err(unavailable)?;
        Ok(())
    }

    async fn lookup_fingerprint(&self, hash: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(fingerprint_key(hash)).await.map_err(unavailable)
    }

    async fn record_fingerprint(
        &self,
        hash: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // NX keeps an existing unexpired record in place; EX bounds the
        // re-identification window.
        let _: Option<String> = redis::cmd("SET")
            .arg(fingerprint_key(hash))
            .arg(uid)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<u64>> {
        Some(self.tx.subscribe())
    }

    async fn publish(&self, count: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .publish(CHANNEL, count)
            .await
            .map_err(|e| StoreError::Publish(e.to_string()))?;
        Ok(())
    }
}
