//! The store handle: opens storage, hands out loggers, serves queries and
//! owns the retention task.
//!
//! # Lifecycle
//!
//! [`LogStore::open`] creates the pool, ensures the schema, and starts
//! retention when `max_age` is non-zero. Retention joins the ambient Tokio
//! runtime if there is one and otherwise runs on its own thread.
//!
//! [`LogStore::close`] stops retention and releases the pool. Loggers that
//! outlive the store get [`LogSinkError::Closed`] from then on.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::errors::{LogSinkError, Result};
use crate::logger::Logger;
use crate::retention::{
    DEFAULT_INTERVAL, DEFAULT_MAX_AGE, PurgeReport, RetentionPolicy, RetentionTask, purge_once,
};
use crate::sqlite::{ConnectionConfig, LogDatabase, MEMORY_PATH};
use crate::types::{LogLevel, LogRecord, MessageFilter};
use crate::writer::{self, SideChannel};

/// Construction options for [`LogStore`].
#[derive(Clone, Debug)]
pub struct LogStoreConfig {
    /// Database file, or [`MEMORY_PATH`] for a process-local store.
    pub path: String,
    /// Maximum record age. Zero disables retention.
    pub max_age: Duration,
    /// Pause between retention passes.
    pub max_age_interval: Duration,
    /// Mirror every write to standard error.
    pub tee_stderr: bool,
    /// Pool and pragma settings.
    pub connection: ConnectionConfig,
    /// Explicit mirror target; takes precedence over `tee_stderr`.
    pub side_channel: Option<SideChannel>,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            max_age: DEFAULT_MAX_AGE,
            max_age_interval: DEFAULT_INTERVAL,
            tee_stderr: false,
            connection: ConnectionConfig::default(),
            side_channel: None,
        }
    }
}

impl LogStoreConfig {
    /// File-backed store at `path` with default retention.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Process-local store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the maximum record age (zero disables retention).
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the pause between retention passes.
    #[must_use]
    pub fn max_age_interval(mut self, interval: Duration) -> Self {
        self.max_age_interval = interval;
        self
    }

    /// Mirror writes to standard error.
    #[must_use]
    pub fn tee_stderr(mut self, enabled: bool) -> Self {
        self.tee_stderr = enabled;
        self
    }

    /// Mirror writes to a custom sink.
    #[must_use]
    pub fn side_channel(mut self, channel: SideChannel) -> Self {
        self.side_channel = Some(channel);
        self
    }

    /// Retention settings derived from this config.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: self.max_age,
            interval: self.max_age_interval,
        }
    }
}

/// State shared between the store and its loggers.
pub(crate) struct SinkInner {
    db: RwLock<Option<LogDatabase>>,
    side_channel: Option<SideChannel>,
}

impl SinkInner {
    fn database(&self) -> Result<LogDatabase> {
        self.db.read().clone().ok_or(LogSinkError::Closed)
    }

    pub(crate) fn write(
        &self,
        ctx: &str,
        level: LogLevel,
        msg: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<()> {
        let db = self.database()?;
        let _ = writer::write(&db, self.side_channel.as_ref(), ctx, level, msg, data)?;
        Ok(())
    }
}

/// Durable, queryable log store.
pub struct LogStore {
    inner: Arc<SinkInner>,
    retention: Mutex<Option<RetentionTask>>,
    policy: RetentionPolicy,
    path: String,
}

impl LogStore {
    /// Open the store described by `config`.
    pub fn open(config: LogStoreConfig) -> Result<Self> {
        let db = LogDatabase::open(&config.path, &config.connection)?;
        let policy = config.retention_policy();

        let retention = if policy.is_enabled() {
            Some(RetentionTask::spawn(db.clone(), policy)?)
        } else {
            None
        };

        let side_channel = config
            .side_channel
            .or_else(|| config.tee_stderr.then(SideChannel::stderr));

        info!(
            path = %config.path,
            persistent = db.is_persistent(),
            retention = policy.is_enabled(),
            max_age_ms = policy.max_age.as_millis(),
            "log store opened"
        );

        Ok(Self {
            inner: Arc::new(SinkInner {
                db: RwLock::new(Some(db)),
                side_channel,
            }),
            retention: Mutex::new(retention),
            policy,
            path: config.path,
        })
    }

    /// Logger bound to `ctx`; `None` means INFO.
    pub fn get_logger(&self, ctx: &str, max_level: Option<LogLevel>) -> Logger {
        Logger::new(
            Arc::clone(&self.inner),
            ctx,
            max_level.unwrap_or(LogLevel::Info),
        )
    }

    /// Records matching `filter`, newest first.
    pub fn get_messages(&self, filter: &MessageFilter) -> Result<Vec<LogRecord>> {
        self.inner.database()?.select(filter)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64> {
        self.inner.database()?.count()
    }

    /// Run one retention pass now with an explicit `max_age`.
    pub fn purge(&self, max_age: Duration) -> Result<PurgeReport> {
        let db = self.inner.database()?;
        let report = purge_once(&db, max_age, chrono::Utc::now())?;
        info!(deleted = report.deleted, cutoff = %report.cutoff, "manual purge complete");
        Ok(report)
    }

    /// Retention settings this store was opened with.
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Whether a background retention loop is scheduled.
    pub fn retention_active(&self) -> bool {
        self.retention.lock().is_some()
    }

    /// Storage location this store was opened at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.db.read().is_none()
    }

    /// Cancel retention and release the storage connection. Idempotent.
    pub fn close(&self) {
        let task = self.retention.lock().take();
        if let Some(task) = task {
            task.cancel();
        }
        if self.inner.db.write().take().is_some() {
            info!(path = %self.path, "log store closed");
        }
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        if let Some(task) = self.retention.get_mut().take() {
            task.cancel();
        }
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
