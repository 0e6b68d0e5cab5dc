//! Idempotent schema creation for the `logs` table.

use rusqlite::Connection;
use tracing::debug;

use crate::errors::Result;

/// Append-only log table. `ctime` is assigned by `SQLite` at insert time.
const LOGS_TABLE: &str = "CREATE TABLE IF NOT EXISTS logs (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    ctx    TEXT    NOT NULL,
    level  INTEGER NOT NULL CHECK (level BETWEEN 0 AND 3),
    msg    TEXT    NOT NULL,
    data   TEXT,
    ctime  TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);";

/// Covering index for time-range queries and retention deletes.
const LOGS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_logs_ctime_ctx_level ON logs (ctime, ctx, level);";

/// Create the table (and, for persistent stores, its index) if missing.
pub fn ensure_schema(conn: &Connection, persistent: bool) -> Result<()> {
    conn.execute_batch(LOGS_TABLE)?;
    if persistent {
        conn.execute_batch(LOGS_INDEX)?;
    }
    debug!(persistent, "log schema ready");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
