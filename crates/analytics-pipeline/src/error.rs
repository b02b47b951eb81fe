//! Pipeline error types.

use analytics_event_store::StoreError;
use analytics_sync_sink::SinkError;
use thiserror::Error;

/// Pipeline error type.
///
/// Nothing here escapes `track()`; config errors surface at build time,
/// storage errors inside a delivery cycle surface to the scheduler as a
/// retry signal.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration, reported at build time only.
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable queue failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Delivery failure.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Anything that should never happen.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;
