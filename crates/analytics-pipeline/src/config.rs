//! Pipeline configuration.

use crate::{PipelineError, PipelineResult};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Default number of events fetched per delivery round.
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 10_000;

/// Smallest accepted delivery round size. Configured values below this
/// are replaced by [`DEFAULT_SYNC_BATCH_SIZE`].
pub const MIN_SYNC_BATCH_SIZE: usize = 1_000;

/// Configuration for ingestion, batching, and delivery.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the collector.
    pub base_url: String,
    /// Endpoint path appended to the base URL.
    pub endpoint_path: String,
    /// Pending-event count at which a delivery cycle is triggered.
    pub batch_size: u64,
    /// Events fetched per delivery round. `None` means the default;
    /// values below [`MIN_SYNC_BATCH_SIZE`] also fall back to the default.
    pub sync_batch_size: Option<usize>,
    /// Initial request headers.
    pub headers: HashMap<String, String>,
    /// Attribute key under which the resolved user id is injected into
    /// each delivered event.
    pub user_id_attribute_key: String,
    /// Optional attribution id stamped onto every captured event.
    pub attribution_id: Option<String>,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint_path: "/events".to_string(),
            batch_size: 50,
            sync_batch_size: None,
            headers: HashMap::new(),
            user_id_attribute_key: "user_id".to_string(),
            attribution_id: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration. Called once at pipeline build time.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.user_id_attribute_key.is_empty() {
            return Err(PipelineError::Config(
                "user_id_attribute_key must not be empty".to_string(),
            ));
        }
        if self.base_url.is_empty() {
            warn!("base_url is empty, delivery will fail until configured");
        }

        Ok(())
    }

    /// Effective per-round fetch size after clamping.
    pub fn sync_batch_size(&self) -> usize {
        match self.sync_batch_size {
            Some(size) if size >= MIN_SYNC_BATCH_SIZE => size,
            Some(size) => {
                warn!(
                    requested = size,
                    minimum = MIN_SYNC_BATCH_SIZE,
                    effective = DEFAULT_SYNC_BATCH_SIZE,
                    "sync_batch_size below minimum, using default"
                );
                DEFAULT_SYNC_BATCH_SIZE
            }
            None => DEFAULT_SYNC_BATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn sync_batch_size_defaults_and_clamps() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.sync_batch_size(), DEFAULT_SYNC_BATCH_SIZE);

        config.sync_batch_size = Some(2_500);
        assert_eq!(config.sync_batch_size(), 2_500);

        config.sync_batch_size = Some(MIN_SYNC_BATCH_SIZE);
        assert_eq!(config.sync_batch_size(), MIN_SYNC_BATCH_SIZE);

        // Below the minimum falls back to the default, not the minimum
        config.sync_batch_size = Some(999);
        assert_eq!(config.sync_batch_size(), DEFAULT_SYNC_BATCH_SIZE);

        config.sync_batch_size = Some(0);
        assert_eq!(config.sync_batch_size(), DEFAULT_SYNC_BATCH_SIZE);
    }
}
