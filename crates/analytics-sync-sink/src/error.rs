//! Sink error types.

use thiserror::Error;

/// Delivery error type.
///
/// `NoConnectivity` is classified separately from HTTP failure so the
/// pipeline can short-circuit without consuming any retry budget.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The connectivity gate reported no network access; no request was made.
    #[error("no network access")]
    NoConnectivity,

    /// The collector answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure (timeout, connection reset, DNS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Payload serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using SinkError.
pub type SinkResult<T> = Result<T, SinkError>;
