//! Batch and single-event HTTP delivery.

use crate::{Connectivity, EventPayload, MutableHeaderProvider, RetryPolicy, SinkError, SinkResult};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sink configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Base URL of the collector.
    pub base_url: String,
    /// Endpoint path appended to the base URL.
    pub endpoint_path: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint_path: "/events".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl SinkConfig {
    /// Full endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint_path)
    }
}

/// Delivery operations the pipeline depends on.
///
/// `send_batch` performs exactly one attempt; batch retry is the
/// scheduler's job. `send_event` is the latency-sensitive immediate path
/// and loop-retries internally.
pub trait EventSink: Send + Sync {
    /// Send a batch of events as a single JSON-array request.
    fn send_batch<'a>(&'a self, batch: &'a [EventPayload]) -> BoxFuture<'a, SinkResult<()>>;

    /// Send one event directly, retrying per the sink's [`RetryPolicy`].
    fn send_event<'a>(&'a self, payload: &'a EventPayload) -> BoxFuture<'a, SinkResult<()>>;
}

/// HTTP implementation of [`EventSink`] over reqwest.
///
/// Headers are read from the provider at call time, so a wholesale header
/// replacement applies to the next request without rebuilding the sink.
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    headers: Arc<MutableHeaderProvider>,
    connectivity: Arc<dyn Connectivity>,
    retry: RetryPolicy,
}

impl HttpEventSink {
    /// Create a new HTTP sink.
    pub fn new(
        config: SinkConfig,
        headers: Arc<MutableHeaderProvider>,
        connectivity: Arc<dyn Connectivity>,
    ) -> SinkResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            headers,
            connectivity,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy used by the single-event path.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One POST attempt. Non-2xx statuses become [`SinkError::Http`].
    async fn post_once<T: Serialize + ?Sized>(&self, body: &T) -> SinkResult<()> {
        let mut request = self.client.post(&self.endpoint);
        for (name, value) in self.headers.snapshot().iter() {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

impl EventSink for HttpEventSink {
    fn send_batch<'a>(&'a self, batch: &'a [EventPayload]) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            if !self.connectivity.has_network_access() {
                debug!(events = batch.len(), "No network access, skipping batch send");
                return Err(SinkError::NoConnectivity);
            }

            debug!(endpoint = %self.endpoint, events = batch.len(), "Sending batch");
            self.post_once(batch).await?;
            info!(events = batch.len(), "Batch sent");
            Ok(())
        })
    }

    fn send_event<'a>(&'a self, payload: &'a EventPayload) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            if !self.connectivity.has_network_access() {
                debug!(event_name = %payload.event_name, "No network access, skipping event send");
                return Err(SinkError::NoConnectivity);
            }

            let mut attempt = 0u32;
            loop {
                attempt += 1;

                match self.post_once(payload).await {
                    Ok(()) => {
                        debug!(event_name = %payload.event_name, attempt, "Event sent");
                        return Ok(());
                    }
                    Err(e) => {
                        if attempt >= self.retry.max_attempts || !self.retry.should_retry(&e) {
                            warn!(
                                event_name = %payload.event_name,
                                attempt,
                                error = %e,
                                "Event send failed"
                            );
                            return Err(e);
                        }

                        let delay = self.retry.compute_delay(attempt);
                        warn!(
                            event_name = %payload.event_name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Event send failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlwaysConnected;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Offline;

    impl Connectivity for Offline {
        fn has_network_access(&self) -> bool {
            false
        }
    }

    struct CountingGate {
        checks: AtomicUsize,
    }

    impl Connectivity for CountingGate {
        fn has_network_access(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    fn make_sink(connectivity: Arc<dyn Connectivity>) -> HttpEventSink {
        let config = SinkConfig {
            base_url: "http://localhost:59999".to_string(),
            ..SinkConfig::default()
        };
        HttpEventSink::new(config, Arc::new(MutableHeaderProvider::default()), connectivity)
            .unwrap()
    }

    fn make_payload() -> EventPayload {
        EventPayload::new("test_event", "1700000000000", 1, "s", HashMap::new())
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let config = SinkConfig {
            base_url: "https://collector.example.com".to_string(),
            endpoint_path: "/v1/events".to_string(),
            ..SinkConfig::default()
        };
        assert_eq!(config.endpoint(), "https://collector.example.com/v1/events");
    }

    #[tokio::test]
    async fn batch_send_short_circuits_offline() {
        let sink = make_sink(Arc::new(Offline));
        let err = sink.send_batch(&[make_payload()]).await.unwrap_err();
        assert!(matches!(err, SinkError::NoConnectivity));
    }

    #[tokio::test]
    async fn single_send_offline_consumes_no_attempts() {
        let gate = Arc::new(CountingGate {
            checks: AtomicUsize::new(0),
        });
        let sink = make_sink(gate.clone());

        let started = std::time::Instant::now();
        let err = sink.send_event(&make_payload()).await.unwrap_err();

        assert!(matches!(err, SinkError::NoConnectivity));
        // Gate consulted once, and no backoff sleep happened
        assert_eq!(gate.checks.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn transport_errors_surface_from_batch_path() {
        // Nothing listens on this port; a single attempt fails fast.
        let sink = make_sink(Arc::new(AlwaysConnected));
        let err = sink.send_batch(&[make_payload()]).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }
}
