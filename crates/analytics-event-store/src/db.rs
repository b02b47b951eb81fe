//! SQLite-backed event queue.

use crate::{migrations, EventRecord, EventStore, NewEventRecord, StoreResult};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// SQLite implementation of [`EventStore`].
///
/// A single connection guarded by a mutex; SQLite serializes writes anyway
/// and the pipeline issues short, sequential statements.
pub struct EventDatabase {
    conn: Mutex<Connection>,
}

impl EventDatabase {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode and performance optimizations
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        // Note: WAL mode doesn't apply to in-memory databases
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_attributes(raw: String) -> HashMap<String, String> {
    // A corrupt attribute blob should not poison the whole fetch.
    serde_json::from_str(&raw).unwrap_or_default()
}

fn insert_with(conn: &Connection, event: &NewEventRecord) -> StoreResult<i64> {
    let attributes = serde_json::to_string(&event.attributes)?;
    conn.execute(
        "INSERT INTO analytics_events (event_name, is_user_identified, event_timestamp, session_marker, attributes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_name,
            event.is_user_identified,
            event.timestamp,
            event.session_marker,
            attributes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl EventStore for EventDatabase {
    fn insert(&self, event: &NewEventRecord) -> StoreResult<i64> {
        let conn = self.conn.lock().expect("lock poisoned");
        let id = insert_with(&conn, event)?;
        debug!(id, event_name = %event.event_name, "Inserted event");
        Ok(id)
    }

    fn insert_many(&self, events: &[NewEventRecord]) -> StoreResult<Vec<i64>> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(insert_with(&tx, event)?);
        }
        tx.commit()?;
        debug!(count = ids.len(), "Inserted event batch");
        Ok(ids)
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock().expect("lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analytics_events WHERE is_sent = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn fetch_oldest(&self, after_id: i64, limit: usize) -> StoreResult<Vec<EventRecord>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, event_name, is_user_identified, event_timestamp, session_marker, attributes
             FROM analytics_events WHERE is_sent = 0 AND id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![after_id, limit as i64], |row| {
                Ok(EventRecord {
                    id: row.get(0)?,
                    event_name: row.get(1)?,
                    is_user_identified: row.get(2)?,
                    timestamp: row.get(3)?,
                    session_marker: row.get(4)?,
                    attributes: parse_attributes(row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn mark_sent(&self, ids: &[i64]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock().expect("lock poisoned");
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql =
            format!("UPDATE analytics_events SET is_sent = 1 WHERE id IN ({placeholders})");
        let marked = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;

        debug!(requested = ids.len(), marked, "Marked events as sent");
        Ok(marked)
    }

    fn delete_by_ids(&self, ids: &[i64]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock().expect("lock poisoned");
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM analytics_events WHERE id IN ({placeholders})");
        let deleted = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;

        debug!(requested = ids.len(), deleted, "Deleted events");
        Ok(deleted)
    }
}
