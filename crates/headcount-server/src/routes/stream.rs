use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::future::Either;
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use crate::state::AppState;

/// `GET /early-access/stream` — long-lived `text/event-stream` of count
/// updates, `data: {"count": N}` per frame.
///
/// The first frame is always the current count, sent immediately. After
/// that the mode depends on the backend:
///
/// - **Pub/sub**: forward the store's broadcast messages verbatim.
/// - **Poll-diff**: a per-connection timer re-reads the count and pushes
///   only when it changed since the last frame sent on this connection.
///
/// Teardown is ownership-driven and deterministic: the timer (or broadcast
/// receiver) lives inside the stream, which Axum drops when the client
/// disconnects or errors. No recurring task outlives its connection.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let first = state.current_count().await.value;

    let updates = match state.store.subscribe() {
        Some(rx) => Either::Left(subscription_updates(rx)),
        None => Either::Right(poll_updates(Arc::clone(&state), first)),
    };

    let frames = stream::once(futures::future::ready(first))
        .chain(updates)
        .map(|count| Ok::<_, Infallible>(count_event(count)));

    Sse::new(frames).keep_alive(KeepAlive::default())
}

fn count_event(count: u64) -> Event {
    Event::default().data(json!({ "count": count }).to_string())
}

fn subscription_updates(rx: broadcast::Receiver<u64>) -> impl Stream<Item = u64> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(count) => return Some((count, rx)),
                // Lagged means intermediate values were dropped; the next
                // message carries the latest count anyway.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

fn poll_updates(state: Arc<AppState>, last_sent: u64) -> impl Stream<Item = u64> {
    let interval = tokio::time::interval(state.config.poll_interval());
    stream::unfold(
        (state, interval, last_sent),
        |(state, mut interval, last_sent)| async move {
            loop {
                interval.tick().await;
                let current = state.current_count().await.value;
                if current != last_sent {
                    return Some((current, (state, interval, current)));
                }
            }
        },
    )
}
