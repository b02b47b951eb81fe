//! Model types for stored analytics events.

use std::collections::HashMap;

/// A captured analytics event as stored in the local queue.
///
/// Records are immutable once written; the delivery worker builds a
/// transient enriched copy at send time and never mutates the stored
/// attribute map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Row id, assigned by SQLite on insert. Monotonic, never reused.
    pub id: i64,
    /// Event type identifier. Non-empty.
    pub event_name: String,
    /// Whether the user was identified at capture time. Decides which
    /// user-id namespace is resolved at send time.
    pub is_user_identified: bool,
    /// Capture timestamp as an epoch-millis string.
    pub timestamp: String,
    /// Opaque session grouping marker. May be empty.
    pub session_marker: String,
    /// Event attributes. Values are stringified at capture time.
    pub attributes: HashMap<String, String>,
}

/// Insert form of [`EventRecord`], before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEventRecord {
    /// Event type identifier. Non-empty.
    pub event_name: String,
    /// Whether the user was identified at capture time.
    pub is_user_identified: bool,
    /// Capture timestamp as an epoch-millis string.
    pub timestamp: String,
    /// Opaque session grouping marker. May be empty.
    pub session_marker: String,
    /// Event attributes. Values are stringified at capture time.
    pub attributes: HashMap<String, String>,
}
