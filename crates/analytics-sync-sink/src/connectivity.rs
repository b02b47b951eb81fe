//! Pre-send network gate.

/// Answers "can we attempt network I/O right now".
///
/// Consulted once at the start of every delivery attempt; a `false` answer
/// short-circuits to [`crate::SinkError::NoConnectivity`] without touching
/// the HTTP client or consuming retry budget.
pub trait Connectivity: Send + Sync {
    fn has_network_access(&self) -> bool;
}

/// Gate that always reports network access. Hosts without a platform
/// connectivity signal use this and let transport errors surface instead.
pub struct AlwaysConnected;

impl Connectivity for AlwaysConnected {
    fn has_network_access(&self) -> bool {
        true
    }
}
