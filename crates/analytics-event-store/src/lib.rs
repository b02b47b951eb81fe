//! Durable event queue for the analytics pipeline.
//!
//! This crate provides:
//! - `EventStore`: the narrow storage contract the pipeline needs
//!   (insert, count, fetch-oldest-unsent, mark-sent, delete-by-ids)
//! - `EventDatabase`: SQLite-backed implementation with WAL mode
//! - Database migrations
//! - Model types for stored events

mod db;
mod error;
mod migrations;
mod models;
mod store;

pub use db::EventDatabase;
pub use error::{StoreError, StoreResult};
pub use migrations::run_migrations;
pub use models::{EventRecord, NewEventRecord};
pub use store::{EventStore, StoreHandle};
