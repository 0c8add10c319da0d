use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    /// TTL of the process-local count cache. Recommended 2–10 s; this shields
    /// the authoritative store from read amplification, it is not a
    /// correctness knob.
    pub count_cache_ttl_ms: u64,
    /// Poll interval for stream connections when the backend has no pub/sub.
    pub poll_interval_ms: u64,
    /// Upper bound on any single call to the authoritative store. Past this
    /// the request switches to fallback counting instead of hanging.
    pub store_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    /// In-process store with native set semantics and pub/sub. Default.
    Memory,
    /// Edge-style key/value store: no atomic set-add, no pub/sub.
    Kv,
    /// Networked Redis, holds the URL from `HEADCOUNT_REDIS_URL`.
    Redis(String),
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("HEADCOUNT_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            store: {
                let raw = std::env::var("HEADCOUNT_STORE")
                    .unwrap_or_else(|_| "memory".to_string());
                match raw.as_str() {
                    "kv" => StoreBackend::Kv,
                    "redis" => {
                        let url = std::env::var("HEADCOUNT_REDIS_URL").map_err(|_| {
                            "HEADCOUNT_REDIS_URL required when STORE=redis".to_string()
                        })?;
                        StoreBackend::Redis(url)
                    }
                    _ => StoreBackend::Memory,
                }
            },
            count_cache_ttl_ms: std::env::var("HEADCOUNT_CACHE_TTL_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            poll_interval_ms: std::env::var("HEADCOUNT_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            store_timeout_ms: std::env::var("HEADCOUNT_STORE_TIMEOUT_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
        })
    }

    pub fn count_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.count_cache_ttl_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
