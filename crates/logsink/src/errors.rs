//! Error types for the log store.
//!
//! [`LogSinkError`] is returned by every fallible store operation. Failures at
//! the storage boundary are grouped under [`StorageError`]; payload encoding
//! and decoding failures surface as [`LogSinkError::Serialization`].

use thiserror::Error;

/// Failures raised by the storage adapter (connection, insert, delete, compact).
#[derive(Debug, Error)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored `ctime` could not be parsed back into a timestamp.
    #[error("invalid stored timestamp {value:?}: {source}")]
    Timestamp {
        /// The raw column value.
        value: String,
        /// Parser failure.
        source: chrono::ParseError,
    },
}

/// Errors that can occur during log store operations.
#[derive(Debug, Error)]
pub enum LogSinkError {
    /// The storage adapter failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Structured `data` could not be encoded on write or decoded on read.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A level name or number outside DEBUG..ERROR.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// The store was closed before the call.
    #[error("log store is closed")]
    Closed,

    /// The dedicated retention worker could not be started.
    #[error("failed to start retention worker: {0}")]
    RetentionWorker(#[source] std::io::Error),
}

impl LogSinkError {
    /// Whether this error originated at the storage boundary.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Whether this error is a payload encoding/decoding failure.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

impl From<rusqlite::Error> for LogSinkError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}

impl From<r2d2::Error> for LogSinkError {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(StorageError::Pool(err))
    }
}

/// Convenience type alias for log store results.
pub type Result<T> = std::result::Result<T, LogSinkError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn sqlite_error_is_storage() {
        let err: LogSinkError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_matches!(err, LogSinkError::Storage(StorageError::Sqlite(_)));
        assert!(err.is_storage());
        assert!(err.to_string().starts_with("storage error: sqlite error"));
    }

    #[test]
    fn serde_error_is_serialization() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: LogSinkError = serde_err.into();
        assert!(err.is_serialization());
        assert!(!err.is_storage());
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn timestamp_error_display() {
        let source = chrono::DateTime::parse_from_rfc3339("nope").unwrap_err();
        let err = LogSinkError::Storage(StorageError::Timestamp {
            value: "nope".into(),
            source,
        });
        assert!(err.to_string().contains("invalid stored timestamp \"nope\""));
    }

    #[test]
    fn invalid_level_display() {
        let err = LogSinkError::InvalidLevel("verbose".into());
        assert_eq!(err.to_string(), "invalid log level: verbose");
    }

    #[test]
    fn retention_worker_display() {
        let err = LogSinkError::RetentionWorker(std::io::Error::other("no threads"));
        assert_eq!(err.to_string(), "failed to start retention worker: no threads");
    }

    #[test]
    fn closed_display() {
        assert_eq!(LogSinkError::Closed.to_string(), "log store is closed");
    }
}
