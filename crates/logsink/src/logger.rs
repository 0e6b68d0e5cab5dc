//! Level-gated logger handles.
//!
//! A [`Logger`] is bound to one context and one minimum level when it is
//! created. Calls below the minimum return immediately without touching the
//! store or the side channel.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::Result;
use crate::store::SinkInner;
use crate::types::LogLevel;

/// Immutable `(ctx, max_level)` view over a [`LogStore`](crate::LogStore).
#[derive(Clone)]
pub struct Logger {
    inner: Arc<SinkInner>,
    ctx: Arc<str>,
    max_level: LogLevel,
}

impl Logger {
    pub(crate) fn new(inner: Arc<SinkInner>, ctx: &str, max_level: LogLevel) -> Self {
        Self {
            inner,
            ctx: Arc::from(ctx),
            max_level,
        }
    }

    /// Context every record from this handle is tagged with.
    pub fn ctx(&self) -> &str {
        &self.ctx
    }

    /// Lowest level this handle persists.
    pub fn max_level(&self) -> LogLevel {
        self.max_level
    }

    /// Whether a call at `level` would be persisted.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.max_level
    }

    /// Persist `msg` at `level` with an optional payload.
    pub fn log(&self, level: LogLevel, msg: &str, data: Option<&serde_json::Value>) -> Result<()> {
        if !self.enabled(level) {
            return Ok(());
        }
        self.inner.write(&self.ctx, level, msg, data)
    }

    /// Persist `msg` at `level` with a serializable payload.
    pub fn log_with<T: Serialize + ?Sized>(&self, level: LogLevel, msg: &str, data: &T) -> Result<()> {
        if !self.enabled(level) {
            return Ok(());
        }
        let value = serde_json::to_value(data)?;
        self.inner.write(&self.ctx, level, msg, Some(&value))
    }

    /// Log at DEBUG.
    pub fn debug(&self, msg: &str) -> Result<()> {
        self.log(LogLevel::Debug, msg, None)
    }

    /// Log at INFO.
    pub fn info(&self, msg: &str) -> Result<()> {
        self.log(LogLevel::Info, msg, None)
    }

    /// Log at WARN.
    pub fn warn(&self, msg: &str) -> Result<()> {
        self.log(LogLevel::Warn, msg, None)
    }

    /// Log at ERROR.
    pub fn error(&self, msg: &str) -> Result<()> {
        self.log(LogLevel::Error, msg, None)
    }

    /// Log at DEBUG with a payload.
    pub fn debug_with<T: Serialize + ?Sized>(&self, msg: &str, data: &T) -> Result<()> {
        self.log_with(LogLevel::Debug, msg, data)
    }

    /// Log at INFO with a payload.
    pub fn info_with<T: Serialize + ?Sized>(&self, msg: &str, data: &T) -> Result<()> {
        self.log_with(LogLevel::Info, msg, data)
    }

    /// Log at WARN with a payload.
    pub fn warn_with<T: Serialize + ?Sized>(&self, msg: &str, data: &T) -> Result<()> {
        self.log_with(LogLevel::Warn, msg, data)
    }

    /// Log at ERROR with a payload.
    pub fn error_with<T: Serialize + ?Sized>(&self, msg: &str, data: &T) -> Result<()> {
        self.log_with(LogLevel::Error, msg, data)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("ctx", &self.ctx)
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
