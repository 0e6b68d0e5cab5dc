//! The write path: serialize one log call, commit it, mirror it.
//!
//! A committed record may optionally be echoed to a [`SideChannel`] as one
//! formatted line. Mirroring happens after the insert and its I/O errors are
//! discarded, so it can never fail or undo a write.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::errors::Result;
use crate::query::format_ctime;
use crate::sqlite::LogDatabase;
use crate::types::LogLevel;

/// Best-effort line sink for mirrored writes.
#[derive(Clone)]
pub struct SideChannel {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SideChannel {
    /// Mirror to the process's standard error.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    /// Mirror to an arbitrary writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Emit one line. Errors are swallowed.
    pub fn emit(&self, level: LogLevel, ctime: &DateTime<Utc>, ctx: &str, msg: &str) {
        let line = format_line(level, ctime, ctx, msg);
        let mut out = self.out.lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}

impl std::fmt::Debug for SideChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideChannel").finish_non_exhaustive()
    }
}

/// `"<LEVEL> [<ctime>] [<ctx>] <msg>\n"`, level padded to five columns.
pub fn format_line(level: LogLevel, ctime: &DateTime<Utc>, ctx: &str, msg: &str) -> String {
    format!(
        "{} [{}] [{ctx}] {msg}\n",
        level.padded_name(),
        format_ctime(ctime)
    )
}

/// Encode an optional payload. JSON `null` is stored as absent.
pub fn encode_data(data: Option<&serde_json::Value>) -> Result<Option<String>> {
    match data {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::to_string(value)?)),
    }
}

/// Commit one record and mirror it if a side channel is configured.
///
/// Returns the id assigned by the store.
pub fn write(
    db: &LogDatabase,
    side_channel: Option<&SideChannel>,
    ctx: &str,
    level: LogLevel,
    msg: &str,
    data: Option<&serde_json::Value>,
) -> Result<i64> {
    let encoded = encode_data(data)?;
    let (id, ctime) = db.insert(ctx, level, msg, encoded.as_deref())?;
    if let Some(channel) = side_channel {
        channel.emit(level, &ctime, ctx, msg);
    }
    Ok(id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::sqlite::{ConnectionConfig, MEMORY_PATH};
    use crate::types::MessageFilter;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn memory_db() -> LogDatabase {
        LogDatabase::open(MEMORY_PATH, &ConnectionConfig::default()).unwrap()
    }

    #[test]
    fn line_format() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(
            format_line(LogLevel::Info, &ts, "req-7", "started"),
            "INFO  [2025-01-15T12:00:00.000Z] [req-7] started\n"
        );
        assert_eq!(
            format_line(LogLevel::Error, &ts, "db", "down"),
            "ERROR [2025-01-15T12:00:00.000Z] [db] down\n"
        );
    }

    #[test]
    fn encode_absent_and_null_as_none() {
        assert_eq!(encode_data(None).unwrap(), None);
        assert_eq!(encode_data(Some(&serde_json::Value::Null)).unwrap(), None);
        assert_eq!(
            encode_data(Some(&json!({"n": 1}))).unwrap().as_deref(),
            Some(r#"{"n":1}"#)
        );
    }

    #[test]
    fn empty_object_is_kept() {
        assert_eq!(encode_data(Some(&json!({}))).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn write_commits_and_mirrors() {
        let db = memory_db();
        let buf = SharedBuf::default();
        let channel = SideChannel::new(buf.clone());

        let id = write(&db, Some(&channel), "job-1", LogLevel::Warn, "slow", None).unwrap();
        let record = db.get(id).unwrap().unwrap();
        assert_eq!(record.ctx, "job-1");
        assert_eq!(record.level, LogLevel::Warn);

        let mirrored = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(
            mirrored,
            format!("WARN  [{}] [job-1] slow\n", format_ctime(&record.ctime))
        );
    }

    #[test]
    fn write_without_channel() {
        let db = memory_db();
        let _ = write(&db, None, "c", LogLevel::Debug, "quiet", Some(&json!([1]))).unwrap();
        let records = db.select(&MessageFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, Some(json!([1])));
    }

    #[test]
    fn failing_side_channel_does_not_fail_write() {
        let db = memory_db();
        let channel = SideChannel::new(BrokenPipe);
        let result = write(&db, Some(&channel), "c", LogLevel::Info, "still stored", None);
        assert!(result.is_ok());
        assert_eq!(db.count().unwrap(), 1);
    }
}
