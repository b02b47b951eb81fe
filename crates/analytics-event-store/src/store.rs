//! Storage contract required by the delivery pipeline.

use crate::{EventRecord, NewEventRecord, StoreResult};
use std::sync::Arc;

/// The narrow storage interface the pipeline depends on.
///
/// Implementations must serialize their own writes. All methods are
/// synchronous; callers treat them as fast local I/O.
pub trait EventStore: Send + Sync {
    /// Persist a single event, returning its assigned id.
    fn insert(&self, event: &NewEventRecord) -> StoreResult<i64>;

    /// Persist a batch of events in one transaction, returning assigned ids
    /// in input order.
    fn insert_many(&self, events: &[NewEventRecord]) -> StoreResult<Vec<i64>>;

    /// Number of unsent events currently queued.
    fn count(&self) -> StoreResult<u64>;

    /// Fetch up to `limit` unsent events with an id greater than
    /// `after_id`, oldest first (by id). Pass 0 to start from the front.
    ///
    /// The cursor lets a delivery loop walk forward past rows it could
    /// not resolve this cycle without refetching them; as long as the
    /// caller advances `after_id` (or marks fetched rows sent), no row is
    /// returned twice across successive calls.
    fn fetch_oldest(&self, after_id: i64, limit: usize) -> StoreResult<Vec<EventRecord>>;

    /// Mark events as sent so later fetches and counts skip them,
    /// returning the number of rows updated.
    ///
    /// Marked rows stay in the store until deleted; marking before
    /// deleting keeps a crash between the two from re-sending the batch.
    fn mark_sent(&self, ids: &[i64]) -> StoreResult<usize>;

    /// Delete events by id, returning the number of rows removed.
    ///
    /// Callers are expected to chunk very large id lists; the store itself
    /// must stay correct for any list it accepts.
    fn delete_by_ids(&self, ids: &[i64]) -> StoreResult<usize>;
}

/// Thread-safe handle to an event store.
pub type StoreHandle = Arc<dyn EventStore>;
