use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store timed out or errored. Callers switch to fallback
    /// counting for the rest of the request; this is never surfaced to the
    /// visitor as an HTTP error.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A count-change notification failed to go out. Non-fatal: the HTTP
    /// response that triggered it is unaffected, stream clients catch up on
    /// the next message or poll tick.
    #[error("publish failed: {0}")]
    Publish(String),
}
