//! Delivery edge for the analytics pipeline.
//!
//! This crate provides:
//! - `EventPayload`: the wire format sent to the collector
//! - `EventSink` / `HttpEventSink`: batch and single-event HTTP delivery
//! - `MutableHeaderProvider`: snapshot-replace request headers
//! - `Connectivity`: the pre-send network gate
//! - `RetryPolicy`: retryable-status classification and jittered backoff

mod connectivity;
mod error;
mod headers;
mod payload;
mod retry;
mod sink;

pub use connectivity::{AlwaysConnected, Connectivity};
pub use error::{SinkError, SinkResult};
pub use headers::MutableHeaderProvider;
pub use payload::{
    EventPayload, ATTRIBUTION_ID_ATTRIBUTE, EVENT_NAME_KEY, PRIMARY_ID_KEY, SESSION_ID_KEY,
    TIME_STAMP_ATTRIBUTE,
};
pub use retry::RetryPolicy;
pub use sink::{EventSink, HttpEventSink, SinkConfig};
