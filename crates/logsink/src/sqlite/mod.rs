//! `SQLite` storage adapter for log records.
//!
//! [`LogDatabase`] owns the connection pool and exposes the four operations
//! the rest of the crate needs: insert, filtered select, age-based delete
//! and compaction.

pub mod connection;
pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::params_from_iter;

pub use connection::{ConnectionConfig, ConnectionPool, MEMORY_PATH, PooledConnection};

use crate::errors::{Result, StorageError};
use crate::query::{CtimeBound, RECORD_COLUMNS, build_select, ctime_bound};
use crate::types::{LogLevel, LogRecord, MessageFilter};

/// Handle to the log database. Cloning shares the pool.
#[derive(Clone)]
pub struct LogDatabase {
    pool: ConnectionPool,
    persistent: bool,
}

/// Raw column values of one `logs` row.
struct RecordRow {
    id: i64,
    ctx: String,
    level: i64,
    msg: String,
    data: Option<String>,
    ctime: String,
}

impl LogDatabase {
    /// Open (or create) the store at `path` and ensure the schema exists.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::open_pool(path, config)?;
        let db = Self {
            pool,
            persistent: !connection::is_memory_path(path),
        };
        schema::ensure_schema(&*db.conn()?, db.persistent)?;
        Ok(db)
    }

    /// Whether the store survives the process.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Check out a pooled connection.
    pub fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Append one record. Returns the assigned `(id, ctime)`.
    pub fn insert(
        &self,
        ctx: &str,
        level: LogLevel,
        msg: &str,
        data: Option<&str>,
    ) -> Result<(i64, DateTime<Utc>)> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO logs (ctx, level, msg, data) VALUES (?1, ?2, ?3, ?4) \
             RETURNING id, ctime",
        )?;
        let (id, ctime): (i64, String) = stmt.query_row(
            rusqlite::params![ctx, level.as_num(), msg, data],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((id, parse_ctime(ctime)?))
    }

    /// Read records matching `filter`, newest first.
    pub fn select(&self, filter: &MessageFilter) -> Result<Vec<LogRecord>> {
        let (sql, params) = build_select(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(RecordRow {
                    id: row.get(0)?,
                    ctx: row.get(1)?,
                    level: row.get(2)?,
                    msg: row.get(3)?,
                    data: row.get(4)?,
                    ctime: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Fetch a single record by id.
    pub fn get(&self, id: i64) -> Result<Option<LogRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {RECORD_COLUMNS} FROM logs WHERE id = ?1"))?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let raw = RecordRow {
            id: row.get(0)?,
            ctx: row.get(1)?,
            level: row.get(2)?,
            msg: row.get(3)?,
            data: row.get(4)?,
            ctime: row.get(5)?,
        };
        row_to_record(raw).map(Some)
    }

    /// Delete every record with `ctime` strictly before `cutoff`.
    ///
    /// Returns the number of deleted rows.
    pub fn delete_older_than(&self, cutoff: &DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = match ctime_bound(cutoff) {
            CtimeBound::BelowAll => 0,
            CtimeBound::Text(bound) => {
                conn.execute("DELETE FROM logs WHERE ctime < ?1", [bound])?
            }
            CtimeBound::AboveAll => conn.execute("DELETE FROM logs", [])?,
        };
        Ok(deleted)
    }

    /// Reclaim free pages left behind by deletes.
    pub fn compact(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("VACUUM;")?;
        if self.persistent {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        Ok(())
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

/// Parse a stored `ctime` column.
fn parse_ctime(value: String) -> Result<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(source) => Err(StorageError::Timestamp { value, source }.into()),
    }
}

/// Decode raw columns into a [`LogRecord`].
fn row_to_record(row: RecordRow) -> Result<LogRecord> {
    let data = row
        .data
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?;

    Ok(LogRecord {
        id: row.id,
        ctx: row.ctx,
        level: LogLevel::try_from(row.level)?,
        msg: row.msg,
        data,
        ctime: parse_ctime(row.ctime)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
