use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware, outer-to-inner:
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — fully open. The counter is called from the marketing
///    page wherever it is hosted, so every origin must be able to POST the
///    visit beacon and open the stream.
///
/// Wrong-method requests (e.g. GET on `/early-access/visit`) get the
/// router's own 405.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/early-access/visit", post(routes::visit::visit))
        .route("/early-access/count", get(routes::count::count))
        .route("/early-access/stream", get(routes::stream::stream))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
