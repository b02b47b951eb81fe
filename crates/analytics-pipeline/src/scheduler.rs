//! In-process unique-work scheduler.
//!
//! Background work is registered under a string key; at most one entry per
//! key is enqueued or running at a time. Re-enqueueing an active key
//! coalesces onto the existing run instead of starting a second one, which
//! is what keeps delivery cycles single-flight no matter how many capture
//! paths cross the batch threshold concurrently.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Observable state of a scheduled work entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Registered, waiting to run (or waiting out a retry backoff).
    Enqueued,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Exhausted its retry budget.
    Failed,
}

impl WorkState {
    /// Whether this state ends the entry's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkState::Succeeded | WorkState::Failed)
    }
}

/// Outcome of one work-unit invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    /// Done; mark the entry Succeeded.
    Success,
    /// Transient failure; re-invoke after backoff.
    Retry,
}

/// A retriable unit of background work.
pub trait WorkUnit: Send + Sync + 'static {
    fn run(&self) -> BoxFuture<'_, WorkResult>;
}

/// Retry settings for re-invoked work.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first re-invocation.
    pub backoff_initial: Duration,
    /// Cap on the re-invocation delay.
    pub backoff_max: Duration,
    /// Invocations per entry before it is marked Failed.
    pub max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backoff_initial: Duration::from_secs(10),
            backoff_max: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

impl SchedulerConfig {
    /// Backoff before re-invocation number `attempt + 1`:
    /// `initial * 2^(attempt - 1)`, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let initial_ms = self.backoff_initial.as_millis() as u64;
        let max_ms = self.backoff_max.as_millis() as u64;

        let shift = attempt.saturating_sub(1);
        let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let delay_ms = initial_ms.saturating_mul(multiplier).min(max_ms);

        Duration::from_millis(delay_ms)
    }
}

/// Observation handle for one scheduled entry.
///
/// Holds a `watch` receiver; dropping the handle tears the observation
/// down without affecting the work itself.
pub struct WorkHandle {
    receiver: watch::Receiver<WorkState>,
}

impl WorkHandle {
    /// Current state of the entry.
    pub fn state(&self) -> WorkState {
        *self.receiver.borrow()
    }

    /// Wait until the entry reaches a terminal state and return it.
    ///
    /// Consumes the handle; the subscription is dropped once the terminal
    /// state is observed.
    pub async fn await_terminal(mut self) -> WorkState {
        loop {
            let state = *self.receiver.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if self.receiver.changed().await.is_err() {
                // Driver is gone; whatever it last published is final.
                return *self.receiver.borrow();
            }
        }
    }
}

type Registry = Arc<Mutex<HashMap<String, watch::Receiver<WorkState>>>>;

/// Task registry enforcing unique work per key.
pub struct SyncScheduler {
    entries: Registry,
    config: SchedulerConfig,
}

impl SyncScheduler {
    /// Create a scheduler with the given retry settings.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Enqueue `work` under `key`, unless an entry for that key is already
    /// enqueued or running; in that case the existing run's handle is
    /// returned and `work` is dropped.
    pub fn enqueue_unique(&self, key: &str, work: Arc<dyn WorkUnit>) -> WorkHandle {
        let mut entries = self.entries.lock().expect("lock poisoned");

        if let Some(existing) = entries.get(key) {
            if !existing.borrow().is_terminal() {
                debug!(key, "Work already pending, coalescing");
                return WorkHandle {
                    receiver: existing.clone(),
                };
            }
        }

        let (tx, rx) = watch::channel(WorkState::Enqueued);
        entries.insert(key.to_string(), rx.clone());
        drop(entries);

        debug!(key, "Work enqueued");
        let registry = self.entries.clone();
        let config = self.config.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            drive(registry, config, key, work, tx).await;
        });

        WorkHandle { receiver: rx }
    }

    /// Current state of the entry under `key`, if one is registered.
    pub fn state_of(&self, key: &str) -> Option<WorkState> {
        let entries = self.entries.lock().expect("lock poisoned");
        entries.get(key).map(|rx| *rx.borrow())
    }
}

/// Run an entry to a terminal state, re-invoking on retry with
/// exponential backoff.
async fn drive(
    registry: Registry,
    config: SchedulerConfig,
    key: String,
    work: Arc<dyn WorkUnit>,
    tx: watch::Sender<WorkState>,
) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let _ = tx.send(WorkState::Running);

        match work.run().await {
            WorkResult::Success => {
                // Remove before publishing so a racing enqueue starts a
                // fresh run instead of observing a finished one.
                registry.lock().expect("lock poisoned").remove(&key);
                let _ = tx.send(WorkState::Succeeded);
                debug!(key = %key, attempt, "Work succeeded");
                return;
            }
            WorkResult::Retry => {
                if attempt >= config.max_attempts {
                    registry.lock().expect("lock poisoned").remove(&key);
                    let _ = tx.send(WorkState::Failed);
                    warn!(key = %key, attempt, "Work failed, retry budget exhausted");
                    return;
                }

                let delay = config.backoff(attempt);
                warn!(
                    key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Work asked for retry, backing off"
                );
                let _ = tx.send(WorkState::Enqueued);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
