//! Pipeline handle: capture, flush, lifecycle, and session plumbing.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::runtime::{IdentityProvider, NonFatalReporter, NoopReporter};
use crate::scheduler::{SchedulerConfig, SyncScheduler, WorkHandle};
use crate::worker::DeliveryWorker;
use analytics_event_store::{NewEventRecord, StoreHandle};
use analytics_sync_sink::{
    Connectivity, EventPayload, EventSink, HttpEventSink, MutableHeaderProvider, SinkConfig,
    ATTRIBUTION_ID_ATTRIBUTE, TIME_STAMP_ATTRIBUTE,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Unique-work key under which delivery cycles are scheduled.
pub const DELIVERY_WORK_KEY: &str = "analytics-delivery";

/// Event tracked when the host reports the app going to background.
pub const APP_BACKGROUND_EVENT: &str = "APP_MINIMISE_OR_EXITED";

/// What prompted a flush request. Logged with the resulting cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The pending counter crossed the batch threshold.
    Threshold,
    /// Host reported the app going to background.
    AppBackground,
    /// Host reported teardown.
    Destroyed,
    /// Explicit caller request.
    Manual,
}

/// The telemetry pipeline.
///
/// A cheaply cloneable handle; clones share state. Entry points are
/// fire-and-forget: `track` never blocks the caller and never surfaces an
/// error. Durability comes from the store; delivery runs as single-flight
/// background work driven by the scheduler.
#[derive(Clone)]
pub struct AnalyticsPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    store: StoreHandle,
    sink: Arc<dyn EventSink>,
    identity: Arc<dyn IdentityProvider>,
    reporter: Arc<dyn NonFatalReporter>,
    headers: Arc<MutableHeaderProvider>,
    scheduler: SyncScheduler,
    worker: Arc<DeliveryWorker>,
    /// Events captured since the last scheduled cycle. Shares its critical
    /// section with the threshold check so each crossing triggers exactly
    /// one cycle.
    pending: tokio::sync::Mutex<u64>,
    session_marker: RwLock<Arc<String>>,
}

impl AnalyticsPipeline {
    /// Build a pipeline delivering over HTTP.
    pub fn new(
        config: PipelineConfig,
        store: StoreHandle,
        identity: Arc<dyn IdentityProvider>,
        connectivity: Arc<dyn Connectivity>,
    ) -> PipelineResult<Self> {
        let headers = Arc::new(MutableHeaderProvider::new(config.headers.clone()));
        let sink_config = SinkConfig {
            base_url: config.base_url.clone(),
            endpoint_path: config.endpoint_path.clone(),
            timeout: config.request_timeout,
        };
        let sink: Arc<dyn EventSink> =
            Arc::new(HttpEventSink::new(sink_config, headers.clone(), connectivity)?);

        Self::with_sink(config, store, sink, headers, identity, Arc::new(NoopReporter))
    }

    /// Build a pipeline around an externally supplied sink.
    pub fn with_sink(
        config: PipelineConfig,
        store: StoreHandle,
        sink: Arc<dyn EventSink>,
        headers: Arc<MutableHeaderProvider>,
        identity: Arc<dyn IdentityProvider>,
        reporter: Arc<dyn NonFatalReporter>,
    ) -> PipelineResult<Self> {
        config.validate()?;

        let worker = Arc::new(DeliveryWorker::new(
            store.clone(),
            sink.clone(),
            identity.clone(),
            config.clone(),
        ));

        info!(
            batch_size = config.batch_size,
            sync_batch_size = config.sync_batch_size(),
            "Analytics pipeline ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                sink,
                identity,
                reporter,
                headers,
                scheduler: SyncScheduler::new(SchedulerConfig::default()),
                worker,
                pending: tokio::sync::Mutex::new(0),
                session_marker: RwLock::new(Arc::new(String::new())),
            }),
        })
    }

    /// Capture an event. Fire-and-forget: persists in the background,
    /// never blocks the caller, never surfaces an error.
    pub fn track(&self, event_name: impl Into<String>, attributes: HashMap<String, String>) {
        if !self.inner.identity.is_analytics_enabled() {
            return;
        }

        let event_name = event_name.into();
        if event_name.is_empty() {
            warn!("Dropping event with empty name");
            return;
        }

        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.capture(event_name, attributes).await {
                warn!(error = %e, "Event capture failed");
                pipeline.inner.reporter.record(&e);
            }
        });
    }

    /// Persist one event and schedule a cycle if this capture crossed the
    /// batch threshold.
    async fn capture(
        &self,
        event_name: String,
        mut attributes: HashMap<String, String>,
    ) -> PipelineResult<()> {
        let timestamp = attributes
            .remove(TIME_STAMP_ATTRIBUTE)
            .unwrap_or_else(now_millis);
        if let Some(attribution_id) = &self.inner.config.attribution_id {
            attributes
                .entry(ATTRIBUTION_ID_ATTRIBUTE.to_string())
                .or_insert_with(|| attribution_id.clone());
        }

        let record = NewEventRecord {
            event_name,
            is_user_identified: self.inner.identity.is_user_logged_in(),
            timestamp,
            session_marker: self.session_marker().as_str().to_string(),
            attributes,
        };

        // Insert and threshold check share the critical section: two
        // concurrent captures can't both observe the same crossing.
        let mut pending = self.inner.pending.lock().await;
        self.inner.store.insert(&record)?;
        *pending += 1;

        if *pending >= self.inner.config.batch_size {
            *pending = 0;
            debug!(
                batch_size = self.inner.config.batch_size,
                "Batch threshold crossed, scheduling delivery"
            );
            self.inner
                .scheduler
                .enqueue_unique(DELIVERY_WORK_KEY, self.inner.worker.clone());
        }

        Ok(())
    }

    /// Schedule a delivery cycle if anything is pending.
    ///
    /// The in-memory counter can under-report (it starts at zero on every
    /// process start), so a zero counter is reconciled against the store
    /// before deciding there is nothing to do.
    pub async fn request_flush(&self, trigger: FlushTrigger) -> Option<WorkHandle> {
        if !self.inner.identity.is_analytics_enabled() {
            return None;
        }

        let mut pending = self.inner.pending.lock().await;
        if *pending == 0 {
            match self.inner.store.count() {
                Ok(0) => {
                    debug!(?trigger, "Nothing to flush");
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    let e = PipelineError::from(e);
                    warn!(?trigger, error = %e, "Failed to check backlog for flush");
                    self.inner.reporter.record(&e);
                    return None;
                }
            }
        }
        *pending = 0;

        info!(?trigger, "Scheduling delivery cycle");
        Some(
            self.inner
                .scheduler
                .enqueue_unique(DELIVERY_WORK_KEY, self.inner.worker.clone()),
        )
    }

    /// Send one event directly over the network, bypassing the durable
    /// queue. Weaker guarantee than `track`: if delivery fails after its
    /// retries, the event is lost.
    pub fn send_event_now(
        &self,
        event_name: impl Into<String>,
        attributes: HashMap<String, String>,
    ) {
        if !self.inner.identity.is_analytics_enabled() {
            return;
        }

        let event_name = event_name.into();
        let pipeline = self.clone();
        tokio::spawn(async move {
            let payload = pipeline.build_payload(event_name, attributes);
            if let Err(e) = pipeline.inner.sink.send_event(&payload).await {
                warn!(event_name = %payload.event_name, error = %e, "Immediate event send failed");
                pipeline.inner.reporter.record(&e.into());
            }
        });
    }

    /// Host signal: the app went to background. Tracks the lifecycle event
    /// and flushes.
    pub async fn on_app_background(&self) -> Option<WorkHandle> {
        if !self.inner.identity.is_analytics_enabled() {
            return None;
        }

        if let Err(e) = self
            .capture(APP_BACKGROUND_EVENT.to_string(), HashMap::new())
            .await
        {
            warn!(error = %e, "Failed to capture background event");
            self.inner.reporter.record(&e);
        }
        self.request_flush(FlushTrigger::AppBackground).await
    }

    /// Host signal: the app is being torn down. Flushes whatever is left.
    pub async fn on_destroyed(&self) -> Option<WorkHandle> {
        self.request_flush(FlushTrigger::Destroyed).await
    }

    /// Replace the session marker stamped onto subsequently captured
    /// events. Already-persisted events keep the marker they were captured
    /// with.
    pub fn update_session_marker(&self, marker: impl Into<String>) {
        *self.inner.session_marker.write().expect("lock poisoned") = Arc::new(marker.into());
    }

    /// Replace the entire outbound header set. Applies to the next request.
    pub fn update_headers(&self, headers: HashMap<String, String>) {
        self.inner.headers.replace(headers);
    }

    /// Events captured since the last scheduled cycle.
    pub async fn pending_count(&self) -> u64 {
        *self.inner.pending.lock().await
    }

    fn session_marker(&self) -> Arc<String> {
        self.inner.session_marker.read().expect("lock poisoned").clone()
    }

    fn build_payload(
        &self,
        event_name: String,
        mut attributes: HashMap<String, String>,
    ) -> EventPayload {
        let timestamp = attributes
            .remove(TIME_STAMP_ATTRIBUTE)
            .unwrap_or_else(now_millis);
        if let Some(attribution_id) = &self.inner.config.attribution_id {
            attributes
                .entry(ATTRIBUTION_ID_ATTRIBUTE.to_string())
                .or_insert_with(|| attribution_id.clone());
        }

        let user_id = if self.inner.identity.is_user_logged_in() {
            self.inner.identity.current_user_id()
        } else {
            self.inner.identity.guest_user_id()
        };
        attributes.insert(
            self.inner.config.user_id_attribute_key.clone(),
            user_id.to_string(),
        );

        EventPayload::new(
            event_name,
            timestamp,
            user_id,
            &self.session_marker(),
            attributes,
        )
    }
}

/// Current time as an epoch-millis string, the stored timestamp format.
fn now_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StaticIdentity;
    use analytics_event_store::{EventDatabase, EventStore};
    use analytics_sync_sink::SinkResult;
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;

    struct NullSink;

    impl EventSink for NullSink {
        fn send_batch<'a>(&'a self, _batch: &'a [EventPayload]) -> BoxFuture<'a, SinkResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn send_event<'a>(&'a self, _payload: &'a EventPayload) -> BoxFuture<'a, SinkResult<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    struct RecordingReporter {
        errors: Mutex<Vec<String>>,
    }

    impl NonFatalReporter for RecordingReporter {
        fn record(&self, error: &PipelineError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn make_pipeline(config: PipelineConfig) -> (AnalyticsPipeline, StoreHandle) {
        let store: StoreHandle = Arc::new(EventDatabase::open_in_memory().unwrap());
        let identity = Arc::new(StaticIdentity {
            user_id: Some(42),
            guest_id: 7,
            ..StaticIdentity::default()
        });
        let pipeline = AnalyticsPipeline::with_sink(
            config,
            store.clone(),
            Arc::new(NullSink),
            Arc::new(MutableHeaderProvider::default()),
            identity,
            Arc::new(NoopReporter),
        )
        .unwrap();
        (pipeline, store)
    }

    #[tokio::test]
    async fn capture_persists_and_counts() {
        let (pipeline, store) = make_pipeline(PipelineConfig::default());

        pipeline
            .capture("screen_view".to_string(), HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(pipeline.pending_count().await, 1);

        let records = store.fetch_oldest(0, 10).unwrap();
        assert_eq!(records[0].event_name, "screen_view");
        assert!(records[0].is_user_identified);
    }

    #[tokio::test]
    async fn capture_prefers_caller_supplied_timestamp() {
        let (pipeline, store) = make_pipeline(PipelineConfig::default());

        let attributes = HashMap::from([(
            TIME_STAMP_ATTRIBUTE.to_string(),
            "123456789".to_string(),
        )]);
        pipeline.capture("e".to_string(), attributes).await.unwrap();

        let records = store.fetch_oldest(0, 1).unwrap();
        assert_eq!(records[0].timestamp, "123456789");
        // Consumed into the timestamp, not duplicated as an attribute
        assert!(records[0].attributes.get(TIME_STAMP_ATTRIBUTE).is_none());
    }

    #[tokio::test]
    async fn capture_injects_attribution_id() {
        let config = PipelineConfig {
            attribution_id: Some("af-123".to_string()),
            ..PipelineConfig::default()
        };
        let (pipeline, store) = make_pipeline(config);

        pipeline.capture("e".to_string(), HashMap::new()).await.unwrap();

        let records = store.fetch_oldest(0, 1).unwrap();
        assert_eq!(
            records[0].attributes.get(ATTRIBUTION_ID_ATTRIBUTE).unwrap(),
            "af-123"
        );
    }

    #[tokio::test]
    async fn threshold_crossing_resets_counter_and_schedules() {
        let config = PipelineConfig {
            batch_size: 2,
            ..PipelineConfig::default()
        };
        let (pipeline, store) = make_pipeline(config);

        pipeline.capture("a".to_string(), HashMap::new()).await.unwrap();
        assert_eq!(pipeline.pending_count().await, 1);

        pipeline.capture("b".to_string(), HashMap::new()).await.unwrap();
        assert_eq!(pipeline.pending_count().await, 0);

        // The scheduled cycle drains the store through the sink
        let handle = pipeline.request_flush(FlushTrigger::Manual).await;
        if let Some(handle) = handle {
            handle.await_terminal().await;
        }
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn flush_with_nothing_pending_is_a_noop() {
        let (pipeline, _store) = make_pipeline(PipelineConfig::default());

        let handle = pipeline.request_flush(FlushTrigger::Manual).await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn flush_reconciles_zero_counter_against_store() {
        let (pipeline, store) = make_pipeline(PipelineConfig::default());

        // Rows in the store but a cold counter, as after a restart
        store
            .insert(&NewEventRecord {
                event_name: "orphan".to_string(),
                is_user_identified: false,
                timestamp: "1".to_string(),
                session_marker: String::new(),
                attributes: HashMap::new(),
            })
            .unwrap();
        assert_eq!(pipeline.pending_count().await, 0);

        let handle = pipeline.request_flush(FlushTrigger::Manual).await;
        assert!(handle.is_some());
        handle.unwrap().await_terminal().await;
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_analytics_makes_entry_points_noops() {
        let store: StoreHandle = Arc::new(EventDatabase::open_in_memory().unwrap());
        let identity = Arc::new(StaticIdentity {
            analytics_enabled: false,
            ..StaticIdentity::default()
        });
        let pipeline = AnalyticsPipeline::with_sink(
            PipelineConfig::default(),
            store.clone(),
            Arc::new(NullSink),
            Arc::new(MutableHeaderProvider::default()),
            identity,
            Arc::new(NoopReporter),
        )
        .unwrap();

        pipeline.track("e", HashMap::new());
        tokio::task::yield_now().await;
        assert_eq!(store.count().unwrap(), 0);

        assert!(pipeline.request_flush(FlushTrigger::Manual).await.is_none());
        assert!(pipeline.on_app_background().await.is_none());
    }

    #[tokio::test]
    async fn background_signal_tracks_lifecycle_event_and_flushes() {
        let (pipeline, store) = make_pipeline(PipelineConfig::default());

        pipeline.capture("e".to_string(), HashMap::new()).await.unwrap();

        let handle = pipeline.on_app_background().await;
        assert!(handle.is_some());
        handle.unwrap().await_terminal().await;

        // Both the original event and the lifecycle marker were delivered
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn session_marker_applies_to_later_captures_only() {
        let (pipeline, store) = make_pipeline(PipelineConfig::default());

        pipeline.capture("before".to_string(), HashMap::new()).await.unwrap();
        pipeline.update_session_marker("session-2");
        pipeline.capture("after".to_string(), HashMap::new()).await.unwrap();

        let records = store.fetch_oldest(0, 10).unwrap();
        assert_eq!(records[0].session_marker, "");
        assert_eq!(records[1].session_marker, "session-2");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_build_time() {
        let store: StoreHandle = Arc::new(EventDatabase::open_in_memory().unwrap());
        let result = AnalyticsPipeline::with_sink(
            PipelineConfig {
                batch_size: 0,
                ..PipelineConfig::default()
            },
            store,
            Arc::new(NullSink),
            Arc::new(MutableHeaderProvider::default()),
            Arc::new(StaticIdentity::default()),
            Arc::new(NoopReporter),
        );

        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn reporter_sees_capture_failures() {
        struct BrokenStore;

        impl EventStore for BrokenStore {
            fn insert(
                &self,
                _event: &NewEventRecord,
            ) -> analytics_event_store::StoreResult<i64> {
                Err(broken())
            }

            fn insert_many(
                &self,
                _events: &[NewEventRecord],
            ) -> analytics_event_store::StoreResult<Vec<i64>> {
                Err(broken())
            }

            fn count(&self) -> analytics_event_store::StoreResult<u64> {
                Err(broken())
            }

            fn fetch_oldest(
                &self,
                _after_id: i64,
                _limit: usize,
            ) -> analytics_event_store::StoreResult<Vec<analytics_event_store::EventRecord>>
            {
                Err(broken())
            }

            fn mark_sent(&self, _ids: &[i64]) -> analytics_event_store::StoreResult<usize> {
                Err(broken())
            }

            fn delete_by_ids(&self, _ids: &[i64]) -> analytics_event_store::StoreResult<usize> {
                Err(broken())
            }
        }

        fn broken() -> analytics_event_store::StoreError {
            analytics_event_store::StoreError::Io(std::io::Error::other("broken store"))
        }

        let reporter = Arc::new(RecordingReporter {
            errors: Mutex::new(Vec::new()),
        });
        let pipeline = AnalyticsPipeline::with_sink(
            PipelineConfig::default(),
            Arc::new(BrokenStore),
            Arc::new(NullSink),
            Arc::new(MutableHeaderProvider::default()),
            Arc::new(StaticIdentity::default()),
            reporter.clone(),
        )
        .unwrap();

        pipeline.track("e", HashMap::new());

        // Give the spawned capture task a chance to run and fail
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("broken store"));
    }
}
