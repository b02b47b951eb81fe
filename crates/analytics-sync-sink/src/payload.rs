//! Wire format sent to the collector.

use serde::Serialize;
use std::collections::HashMap;

/// Wire key for the event name.
pub const EVENT_NAME_KEY: &str = "ep_event_name";
/// Attribute key a caller may use to supply its own capture timestamp.
pub const TIME_STAMP_ATTRIBUTE: &str = "ep_time_stamp";
/// Wire key for the per-event primary id (`<user_id>_<timestamp>`).
pub const PRIMARY_ID_KEY: &str = "ep_primary_id";
/// Wire key for the session id (`<user_id>_<session_marker>`).
pub const SESSION_ID_KEY: &str = "ep_session_id";
/// Attribute key under which the configured attribution id is injected at
/// capture time.
pub const ATTRIBUTION_ID_ATTRIBUTE: &str = "appsflyer_id";

/// One event as sent over the wire. Batch requests are a JSON array of
/// these objects.
///
/// Attributes are flattened into the top-level object alongside the `ep_*`
/// keys; all attribute values are strings (stringified at capture time).
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    #[serde(rename = "ep_event_name")]
    pub event_name: String,
    #[serde(rename = "ep_time_stamp")]
    pub time_stamp: String,
    #[serde(rename = "ep_primary_id")]
    pub primary_id: String,
    #[serde(rename = "ep_session_id")]
    pub session_id: String,
    #[serde(flatten)]
    pub attributes: HashMap<String, String>,
}

impl EventPayload {
    /// Build a payload for an event captured with the given user id and
    /// session marker.
    pub fn new(
        event_name: impl Into<String>,
        time_stamp: impl Into<String>,
        user_id: i64,
        session_marker: &str,
        attributes: HashMap<String, String>,
    ) -> Self {
        let time_stamp = time_stamp.into();
        Self {
            event_name: event_name.into(),
            primary_id: format!("{user_id}_{time_stamp}"),
            session_id: format!("{user_id}_{session_marker}"),
            time_stamp,
            attributes,
        }
    }
}
