//! Delivery worker: drains the durable queue in rounds.

use crate::config::PipelineConfig;
use crate::runtime::IdentityProvider;
use crate::scheduler::{WorkResult, WorkUnit};
use analytics_event_store::{EventRecord, StoreHandle};
use analytics_sync_sink::{EventPayload, EventSink};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Max ids per DELETE statement, kept under SQLite's bound-variable limit.
const DELETE_CHUNK_SIZE: usize = 900;

/// One delivery cycle: count the backlog, then fetch-send-delete in rounds
/// of at most `sync_batch_size` events until the backlog observed at the
/// start has been worked through. Fetches walk forward through an id
/// cursor, so a failed round is left behind rather than refetched.
///
/// Rows are marked sent and deleted only after their batch was
/// acknowledged, so delivery is at-least-once. A failed round is logged
/// and skipped; its rows stay queued for a later cycle rather than
/// blocking the rest of this one.
pub struct DeliveryWorker {
    store: StoreHandle,
    sink: Arc<dyn EventSink>,
    identity: Arc<dyn IdentityProvider>,
    config: PipelineConfig,
}

impl DeliveryWorker {
    pub fn new(
        store: StoreHandle,
        sink: Arc<dyn EventSink>,
        identity: Arc<dyn IdentityProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            sink,
            identity,
            config,
        }
    }

    async fn run_cycle(&self) -> WorkResult {
        let total_pending = match self.store.count() {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to count pending events");
                return WorkResult::Retry;
            }
        };
        if total_pending == 0 {
            debug!("No pending events");
            return WorkResult::Success;
        }

        let round_size = self.config.sync_batch_size();
        // One identity resolution per cycle; every record in it gets a
        // consistent answer.
        let current_user = self.identity.current_user_id();
        let guest_user = self.identity.guest_user_id();

        info!(total_pending, round_size, "Starting delivery cycle");

        let mut processed: u64 = 0;
        // Id watermark of the last fetched row. Advancing it every round
        // keeps a failed round from being refetched within this cycle.
        let mut last_seen_id: i64 = 0;
        while processed < total_pending {
            let want = round_size.min((total_pending - processed) as usize);
            let records = match self.store.fetch_oldest(last_seen_id, want) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch pending events");
                    return WorkResult::Retry;
                }
            };
            // Fewer rows than asked for means the queue has drained under
            // us; stop here and let a later cycle pick up whatever is left.
            if records.len() < want {
                break;
            }
            last_seen_id = match records.last() {
                Some(last) => last.id,
                None => break,
            };
            let fetched = records.len() as u64;

            let ids: Vec<i64> = records.iter().map(|record| record.id).collect();
            let payloads: Vec<EventPayload> = records
                .iter()
                .map(|record| self.to_payload(record, current_user, guest_user))
                .collect();

            match self.sink.send_batch(&payloads).await {
                Ok(()) => {
                    // Mark before deleting, per chunk: a crash between the
                    // two leaves the rows invisible to fetch instead of
                    // queued for a duplicate send.
                    let mut deleted = 0usize;
                    for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
                        if let Err(e) = self.store.mark_sent(chunk) {
                            warn!(error = %e, "Failed to mark delivered events");
                            return WorkResult::Retry;
                        }
                        match self.store.delete_by_ids(chunk) {
                            Ok(n) => deleted += n,
                            Err(e) => {
                                warn!(error = %e, "Failed to delete delivered events");
                                return WorkResult::Retry;
                            }
                        }
                    }
                    info!(sent = fetched, deleted, "Delivered event batch");
                }
                Err(e) => {
                    // Skipped this cycle; the rows stay queued behind the
                    // cursor and a later cycle will pick them up again.
                    warn!(events = fetched, error = %e, "Batch delivery failed");
                }
            }

            processed += fetched;
        }

        WorkResult::Success
    }

    /// Build the wire payload for a stored record, resolving the user id
    /// and merging it into a copy of the captured attributes.
    fn to_payload(&self, record: &EventRecord, current_user: i64, guest_user: i64) -> EventPayload {
        let user_id = if record.is_user_identified {
            current_user
        } else {
            guest_user
        };

        let mut attributes = record.attributes.clone();
        attributes.insert(
            self.config.user_id_attribute_key.clone(),
            user_id.to_string(),
        );

        EventPayload::new(
            record.event_name.clone(),
            record.timestamp.clone(),
            user_id,
            &record.session_marker,
            attributes,
        )
    }
}

impl WorkUnit for DeliveryWorker {
    fn run(&self) -> BoxFuture<'_, WorkResult> {
        Box::pin(self.run_cycle())
    }
}
