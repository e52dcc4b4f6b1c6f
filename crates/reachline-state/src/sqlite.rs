//! `SQLite`-backed implementation of [`ProgressStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Status transitions
//! are single `UPDATE` statements, so concurrent in-flight items never lose
//! updates; aggregate counts are derived from the `work_items` table rather
//! than maintained as separate counters.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;

use reachline_types::item::{ContactResult, ItemId, ItemStatus, WorkItem};
use reachline_types::state::{ItemOutcome, RunError, RunRecord, RunStats, RunStatus};

use crate::backend::ProgressStore;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for progress tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS work_items (
    id TEXT PRIMARY KEY,
    resource_key TEXT NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    processed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items (status);

CREATE TABLE IF NOT EXISTS item_results (
    item_id TEXT PRIMARY KEY REFERENCES work_items(id),
    result_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS engine_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    pending INTEGER DEFAULT 0,
    processing INTEGER DEFAULT 0,
    completed INTEGER DEFAULT 0,
    failed INTEGER DEFAULT 0,
    total INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS run_outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES engine_runs(id),
    item_id TEXT NOT NULL,
    status TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_run_outcomes_run ON run_outcomes (run_id);

CREATE TABLE IF NOT EXISTS run_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES engine_runs(id),
    item_id TEXT NOT NULL,
    message TEXT NOT NULL,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_run_errors_run ON run_errors (run_id);
";

/// `SQLite`-backed progress storage.
///
/// Create with [`SqliteProgressStore::open`] for file-backed persistence
/// or [`SqliteProgressStore::in_memory`] for tests.
pub struct SqliteProgressStore {
    conn: Mutex<Connection>,
}

impl SqliteProgressStore {
    /// Open or create a `SQLite` progress database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created, or a
    /// backend error if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory progress store (for testing).
    ///
    /// # Errors
    ///
    /// Returns a backend error if the in-memory database can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Format current UTC time for `SQLite` storage.
    fn now_sqlite() -> String {
        Utc::now().format(SQLITE_DATETIME_FMT).to_string()
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    fn parse_item_status(raw: &str) -> error::Result<ItemStatus> {
        ItemStatus::parse(raw)
            .ok_or_else(|| StateError::Corrupt(format!("unknown item status '{raw}'")))
    }

    fn parse_run_status(raw: &str) -> error::Result<RunStatus> {
        RunStatus::parse(raw)
            .ok_or_else(|| StateError::Corrupt(format!("unknown run status '{raw}'")))
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<(WorkItem, String)> {
        let status_raw: String = row.get(3)?;
        let processed_at: Option<String> = row.get(5)?;
        Ok((
            WorkItem {
                id: ItemId::new(row.get::<_, String>(0)?),
                resource_key: row.get::<_, String>(1)?.into(),
                name: row.get(2)?,
                // Placeholder; replaced after status parsing outside rusqlite's error type.
                status: ItemStatus::Pending,
                error: row.get(4)?,
                processed_at: processed_at.map(|ts| Self::sqlite_to_iso8601(&ts)),
            },
            status_raw,
        ))
    }

    #[cfg(test)]
    fn item_status(&self, id: &str) -> error::Result<ItemStatus> {
        let conn = self.lock_conn()?;
        let raw: String = conn.query_row(
            "SELECT status FROM work_items WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Self::parse_item_status(&raw)
    }

    #[cfg(test)]
    fn outcome_count(&self, run_id: i64) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM run_outcomes WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )
        .map_err(StateError::Sqlite)
    }
}

impl ProgressStore for SqliteProgressStore {
    fn insert_items(&self, items: &[WorkItem]) -> error::Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::context("insert_items: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT OR IGNORE INTO work_items (id, resource_key, name, status) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| StateError::context("insert_items: prepare", e))?;

        let mut inserted = 0u64;
        for item in items {
            let changed = stmt
                .execute(rusqlite::params![
                    item.id.as_str(),
                    item.resource_key.as_str(),
                    item.name,
                    item.status.as_str(),
                ])
                .map_err(|e| StateError::context("insert_items: execute", e))?;
            inserted += changed as u64;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::context("insert_items: commit", e))?;

        Ok(inserted)
    }

    fn item_count(&self) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM work_items", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn load_unprocessed(&self) -> error::Result<Vec<WorkItem>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, resource_key, name, status, error, processed_at \
             FROM work_items WHERE status IN ('pending', 'processing') ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for (mut item, status_raw) in rows {
            item.status = Self::parse_item_status(&status_raw)?;
            items.push(item);
        }
        Ok(items)
    }

    fn requeue_failed(&self) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE work_items SET status = 'pending', error = NULL, processed_at = NULL \
             WHERE status = 'failed'",
            [],
        )?;
        Ok(changed as u64)
    }

    fn mark_processing(&self, item: &ItemId) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE work_items SET status = 'processing' WHERE id = ?1",
            [item.as_str()],
        )?;
        Ok(())
    }

    fn mark_completed(&self, item: &ItemId) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE work_items SET status = 'completed', error = NULL, processed_at = ?1 \
             WHERE id = ?2",
            rusqlite::params![Self::now_sqlite(), item.as_str()],
        )?;
        Ok(())
    }

    fn mark_failed(&self, item: &ItemId, error_message: &str) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE work_items SET status = 'failed', error = ?1, processed_at = ?2 \
             WHERE id = ?3",
            rusqlite::params![error_message, Self::now_sqlite(), item.as_str()],
        )?;
        Ok(())
    }

    fn persist_result(&self, item: &ItemId, result: &ContactResult) -> error::Result<()> {
        let json = serde_json::to_string(result)
            .map_err(|e| StateError::Corrupt(format!("encode result: {e}")))?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO item_results (item_id, result_json, updated_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(item_id) DO UPDATE SET result_json = ?2, updated_at = ?3",
            rusqlite::params![item.as_str(), json, Self::now_sqlite()],
        )?;
        Ok(())
    }

    fn load_results(&self) -> error::Result<Vec<ContactResult>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT result_json FROM item_results ORDER BY item_id")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        payloads
            .iter()
            .map(|json| {
                serde_json::from_str(json)
                    .map_err(|e| StateError::Corrupt(format!("decode result: {e}")))
            })
            .collect()
    }

    #[allow(clippy::cast_possible_wrap)]
    fn start_run(&self, total: u64) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO engine_runs (status, total) VALUES (?1, ?2)",
            rusqlite::params![RunStatus::Running.as_str(), total as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE engine_runs SET status = ?1, finished_at = datetime('now'), \
             pending = ?2, processing = ?3, completed = ?4, failed = ?5, total = ?6 \
             WHERE id = ?7",
            rusqlite::params![
                status.as_str(),
                stats.pending as i64,
                stats.processing as i64,
                stats.completed as i64,
                stats.failed as i64,
                stats.total as i64,
                run_id,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn record_outcome(&self, run_id: i64, outcome: &ItemOutcome) -> error::Result<()> {
        let details = outcome
            .details
            .as_ref()
            .map(serde_json::Value::to_string);
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO run_outcomes (run_id, item_id, status, duration_ms, details) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                run_id,
                outcome.item_id.as_str(),
                outcome.status.as_str(),
                outcome.duration_ms as i64,
                details,
            ],
        )
        .map_err(|e| StateError::context("record_outcome: insert", e))?;
        Ok(())
    }

    fn append_run_error(&self, run_id: i64, error: &RunError) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO run_errors (run_id, item_id, message, occurred_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                run_id,
                error.item_id.as_str(),
                error.message,
                error.timestamp,
            ],
        )
        .map_err(|e| StateError::context("append_run_error: insert", e))?;
        Ok(())
    }

    fn run_errors(&self, run_id: i64) -> error::Result<Vec<RunError>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, message, occurred_at FROM run_errors \
             WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([run_id], |row| {
                Ok(RunError {
                    item_id: ItemId::new(row.get::<_, String>(0)?),
                    message: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    #[allow(clippy::cast_sign_loss)]
    fn run_stats(&self) -> error::Result<RunStats> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM work_items GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stats = RunStats::default();
        for (status_raw, count) in counts {
            let count = count.max(0) as u64;
            match Self::parse_item_status(&status_raw)? {
                ItemStatus::Pending => stats.pending = count,
                ItemStatus::Processing => stats.processing = count,
                ItemStatus::Completed => stats.completed = count,
                ItemStatus::Failed => stats.failed = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    #[allow(clippy::cast_sign_loss)]
    fn latest_runs(&self, limit: u64) -> error::Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, started_at, finished_at, \
                    pending, processing, completed, failed, total \
             FROM engine_runs ORDER BY id DESC LIMIT ?1",
        )?;
        #[allow(clippy::cast_possible_wrap)]
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, status_raw, started, finished, pending, processing, completed, failed, total) in
            rows
        {
            records.push(RunRecord {
                run_id: id,
                status: Self::parse_run_status(&status_raw)?,
                started_at: Self::sqlite_to_iso8601(&started),
                finished_at: finished.map(|ts| Self::sqlite_to_iso8601(&ts)),
                stats: RunStats {
                    pending: pending.max(0) as u64,
                    processing: processing.max(0) as u64,
                    completed: completed.max(0) as u64,
                    failed: failed.max(0) as u64,
                    total: total.max(0) as u64,
                },
            });
        }
        Ok(records)
    }
}
