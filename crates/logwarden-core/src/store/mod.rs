//! SQLite-backed record store.
//!
//! One table of normalized records plus the secondary indexes the query
//! paths lean on. The UNIQUE index over (timestamp, event_id, provider) is
//! the dedup authority: inserts run as `INSERT OR IGNORE`, and an ignored
//! row is a duplicate, never an error. No prior existence check is made, so
//! two writers racing on the same logical record cannot double-insert it.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::RecordFilter;
use crate::record::LogRecord;

mod aggregate;

pub use aggregate::{AggregationResult, HistogramBucket};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS log_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event_id INTEGER NOT NULL DEFAULT 0,
    level TEXT NOT NULL,
    log_name TEXT NOT NULL,
    provider TEXT NOT NULL,
    message TEXT NOT NULL,
    machine_name TEXT NOT NULL,
    collected_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_dedup
    ON log_records (timestamp, event_id, provider);
CREATE INDEX IF NOT EXISTS idx_records_event_id ON log_records (event_id);
CREATE INDEX IF NOT EXISTS idx_records_level ON log_records (level);
CREATE INDEX IF NOT EXISTS idx_records_log_name ON log_records (log_name);
CREATE INDEX IF NOT EXISTS idx_records_provider ON log_records (provider);
CREATE INDEX IF NOT EXISTS idx_records_collected_at ON log_records (collected_at);
";

const SELECT_COLUMNS: &str =
    "timestamp, event_id, level, log_name, provider, message, machine_name, collected_at";

/// Store of normalized log records.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) the store at the given path, creating parent
    /// directories and the schema as needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open a store backed by memory only. Used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Insert a batch under the dedup constraint. Returns one flag per
    /// record: `true` when it was newly inserted, `false` when a record
    /// with the same dedup key already existed.
    pub fn insert_records(&self, records: &[LogRecord]) -> StoreResult<Vec<bool>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO log_records
             (timestamp, event_id, level, log_name, provider, message, machine_name, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let mut fresh = Vec::with_capacity(records.len());
        for record in records {
            let changed = stmt.execute(params![
                record.timestamp,
                record.event_id,
                record.level,
                record.log_name,
                record.provider,
                record.message,
                record.machine_name,
                record.collected_at,
            ])?;
            fresh.push(changed == 1);
        }
        debug!(
            batch = records.len(),
            inserted = fresh.iter().filter(|f| **f).count(),
            "insert batch finished"
        );
        Ok(fresh)
    }

    /// Fetch records matching the filter, newest first, capped at `limit`.
    pub fn query(&self, filter: &RecordFilter, limit: usize) -> StoreResult<Vec<LogRecord>> {
        let (where_clause, params) = filter.to_sql();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM log_records{where_clause}
             ORDER BY timestamp DESC LIMIT {limit}"
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok(LogRecord {
                timestamp: row.get(0)?,
                event_id: row.get(1)?,
                level: row.get(2)?,
                log_name: row.get(3)?,
                provider: row.get(4)?,
                message: row.get(5)?,
                machine_name: row.get(6)?,
                collected_at: row.get(7)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Total number of stored records.
    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let n = conn.query_row("SELECT COUNT(*) FROM log_records", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Delete records whose timestamp sorts before the cutoff (canonical
    /// RFC 3339). Returns the number deleted.
    pub fn delete_older_than(&self, cutoff: &str) -> StoreResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM log_records WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(deleted as u64)
    }
}
