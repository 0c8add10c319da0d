use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use headcount_core::config::{Config, StoreBackend};
use headcount_server::app::build_app;
use headcount_server::state::AppState;
use headcount_store::memory::MemoryStore;
use headcount_store::DedupStore;

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn test_config(cache_ttl_ms: u64) -> Config {
    Config {
        port: 0,
        store: StoreBackend::Memory,
        count_cache_ttl_ms: cache_ttl_ms,
        poll_interval_ms: 100,
        store_timeout_ms: 500,
    }
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

fn count_request() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/early-access/count")
        .body(Body::empty())
        .expect("build request")
}

fn visit_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/early-access/visit")
        .header("user-agent", CHROME_UA)
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .expect("build request")
}

#[tokio::test]
async fn test_count_starts_at_zero() {
    let store = Arc::new(MemoryStore::new());
    let app = build_app(Arc::new(AppState::new(store, test_config(5000))));

    let response = app.oneshot(count_request()).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["count"], 0);
    assert_eq!(json["source"], "authoritative");
}

// ============================================================
// Cache bound: the writer node reads its own write, even when
// the authoritative value changes underneath it
// ============================================================
#[tokio::test]
async fn test_writer_node_reads_its_own_write() {
    let store = Arc::new(MemoryStore::new());
    let app = build_app(Arc::new(AppState::new(store.clone(), test_config(5000))));

    app.clone().oneshot(visit_request()).await.expect("request");

    // Another node overrides the persisted scalar; our cache still holds the
    // value this node wrote moments ago.
    store.set_count(999).await.expect("set_count");

    let response = app.oneshot(count_request()).await.expect("request");
    let json = json_body(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["source"], "cache");
}

#[tokio::test]
async fn test_expired_cache_rereads_the_store() {
    let store = Arc::new(MemoryStore::new());
    let app = build_app(Arc::new(AppState::new(store.clone(), test_config(0))));

    app.clone().oneshot(visit_request()).await.expect("request");
    store.set_count(999).await.expect("set_count");

    let response = app.oneshot(count_request()).await.expect("request");
    let json = json_body(response).await;
    assert_eq!(json["count"], 999);
    assert_eq!(json["source"], "authoritative");
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let store = Arc::new(MemoryStore::new());
    let app = build_app(Arc::new(AppState::new(store, test_config(5000))));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/early-access/count")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
