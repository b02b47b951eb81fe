//! # Client-side telemetry pipeline
//!
//! Accepts discrete event records, buffers them durably in SQLite, and
//! drives a background delivery process to a remote collector with retry,
//! backoff, and partial-failure recovery. Delivery is at-least-once:
//! events are only deleted after a confirmed send covering them.
//!
//! ## Architecture
//!
//! ```text
//! track() ──▶ ┌────────────────┐     ┌───────────────┐     ┌───────────┐
//!             │  EventStore    │────▶│ DeliveryWorker│────▶│ Collector │
//!             │  (SQLite WAL)  │     │ (batch loop)  │     │  (HTTP)   │
//!             └────────────────┘     └───────┬───────┘     └───────────┘
//!                                            │
//!                                    ┌───────▼───────┐
//!                                    │ SyncScheduler │
//!                                    │ (unique work) │
//!                                    └───────────────┘
//! ```
//!
//! ## Key behaviors
//!
//! - **Batch trigger**: every `batch_size`-th captured event schedules a
//!   delivery cycle; the counter and the check share one critical section
//!   so each crossing triggers exactly one cycle.
//!
//! - **Single-flight delivery**: cycles are scheduled under a unique work
//!   key; concurrent triggers coalesce onto the run already in flight.
//!
//! - **Partial failure**: a failed batch is skipped for the current cycle
//!   and retried on a later one; it never blocks newer batches.
//!
//! - **Retry with backoff**: a cycle that can't reach the store is
//!   re-invoked with exponential backoff (10s doubling, capped) until its
//!   retry budget runs out.
//!
//! ## Example
//!
//! ```ignore
//! use analytics_event_store::EventDatabase;
//! use analytics_pipeline::{AnalyticsPipeline, PipelineConfig, StaticIdentity};
//! use analytics_sync_sink::AlwaysConnected;
//! use std::sync::Arc;
//!
//! let store = Arc::new(EventDatabase::open("analytics.db")?);
//! let pipeline = AnalyticsPipeline::new(
//!     PipelineConfig {
//!         base_url: "https://collector.example.com".into(),
//!         ..PipelineConfig::default()
//!     },
//!     store,
//!     Arc::new(StaticIdentity::default()),
//!     Arc::new(AlwaysConnected),
//! )?;
//!
//! pipeline.track("screen_view", attributes);
//! ```

mod config;
mod error;
mod pipeline;
mod runtime;
mod scheduler;
mod worker;

pub use config::{PipelineConfig, DEFAULT_SYNC_BATCH_SIZE, MIN_SYNC_BATCH_SIZE};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{AnalyticsPipeline, FlushTrigger, APP_BACKGROUND_EVENT, DELIVERY_WORK_KEY};
pub use runtime::{IdentityProvider, NonFatalReporter, NoopReporter, StaticIdentity};
pub use scheduler::{SchedulerConfig, SyncScheduler, WorkHandle, WorkResult, WorkState, WorkUnit};
pub use worker::DeliveryWorker;
