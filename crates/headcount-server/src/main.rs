use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use headcount_core::config::{Config, StoreBackend};
use headcount_server::{app::build_app, state::AppState};
use headcount_store::kv::{KvDedupStore, MemoryKv};
use headcount_store::memory::MemoryStore;
use headcount_store::DedupStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("headcount=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let store: Arc<dyn DedupStore> = match &cfg.store {
        StoreBackend::Memory => {
            info!("Using in-memory store (single node; counts reset on restart)");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Kv => {
            info!("Using edge-KV store profile (poll-diff streaming)");
            Arc::new(KvDedupStore::new(MemoryKv::new()))
        }
        StoreBackend::Redis(url) => redis_store(url).await?,
    };

    info!(
        cache_ttl_ms = cfg.count_cache_ttl_ms,
        poll_interval_ms = cfg.poll_interval_ms,
        store_timeout_ms = cfg.store_timeout_ms,
        "Visitor counter configured"
    );

    let state = Arc::new(AppState::new(store, cfg.clone()));
    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = build_app(Arc::clone(&state));

    info!(port = cfg.port, "headcount listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

#[cfg(feature = "redis")]
async fn redis_store(url: &str) -> Result<Arc<dyn DedupStore>> {
    info!("Using Redis store (pub/sub streaming)");
    let store = headcount_store::redis::RedisStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_url: &str) -> Result<Arc<dyn DedupStore>> {
    anyhow::bail!("HEADCOUNT_STORE=redis requires building with `--features redis`")
}
