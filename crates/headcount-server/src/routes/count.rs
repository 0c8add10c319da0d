use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /early-access/count` — read-only current count.
///
/// Served from the process-local cache when fresh; infallible (degrades to
/// the fallback count rather than erroring).
pub async fn count(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.current_count().await;
    Json(json!({
        "count": snapshot.value,
        "source": snapshot.source,
    }))
}
