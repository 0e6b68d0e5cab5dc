//! Record, level and filter types shared across the crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LogSinkError;

/// Severity with its stored numeric value (lower = more verbose).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug = 0,
    /// Normal operation (default minimum for new loggers).
    Info = 1,
    /// Non-fatal issues.
    Warn = 2,
    /// Failures.
    Error = 3,
}

impl LogLevel {
    /// Every level, most verbose first.
    pub const ALL: [Self; 4] = [Self::Debug, Self::Info, Self::Warn, Self::Error];

    /// Numeric value stored in the `level` column.
    #[must_use]
    pub const fn as_num(self) -> i64 {
        self as i64
    }

    /// Canonical display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Name right-padded to five columns, as used in mirrored lines.
    #[must_use]
    pub const fn padded_name(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i64> for LogLevel {
    type Error = LogSinkError;

    fn try_from(value: i64) -> Result<Self, LogSinkError> {
        match value {
            0 => Ok(Self::Debug),
            1 => Ok(Self::Info),
            2 => Ok(Self::Warn),
            3 => Ok(Self::Error),
            other => Err(LogSinkError::InvalidLevel(other.to_string())),
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogSinkError;

    /// Accepts a case-insensitive name or a numeric value.
    fn from_str(s: &str) -> Result<Self, LogSinkError> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => other
                .parse::<i64>()
                .map_err(|_| LogSinkError::InvalidLevel(trimmed.to_string()))
                .and_then(Self::try_from),
        }
    }
}

/// A persisted log record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Store-assigned surrogate key, never reused.
    pub id: i64,
    /// Correlation tag.
    pub ctx: String,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub msg: String,
    /// Structured payload, `None` when the write carried none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Insertion time (UTC, millisecond precision).
    pub ctime: DateTime<Utc>,
}

/// Filter for [`LogStore::get_messages`](crate::LogStore::get_messages).
///
/// All fields combine with AND. Empty `levels`/`ctxs` place no restriction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageFilter {
    /// Accepted level numbers.
    pub levels: Vec<i64>,
    /// Accepted contexts.
    pub ctxs: Vec<String>,
    /// Exclusive lower bound on `ctime`.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `ctime`.
    pub before: Option<DateTime<Utc>>,
    /// Maximum number of records, most recent first.
    pub limit: Option<usize>,
}

impl MessageFilter {
    /// Filter matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse level entries given as numbers or names, dropping anything unparseable.
    pub fn parse_levels<I, S>(entries: I) -> Vec<i64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .filter_map(|e| {
                let raw = e.as_ref().trim();
                raw.parse::<i64>()
                    .ok()
                    .or_else(|| raw.parse::<LogLevel>().ok().map(LogLevel::as_num))
            })
            .collect()
    }

    /// Restrict to the given levels.
    #[must_use]
    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = levels.into_iter().map(LogLevel::as_num).collect();
        self
    }

    /// Restrict to the given contexts.
    #[must_use]
    pub fn ctxs<S: Into<String>>(mut self, ctxs: impl IntoIterator<Item = S>) -> Self {
        self.ctxs = ctxs.into_iter().map(Into::into).collect();
        self
    }

    /// Only records strictly newer than `ts`.
    #[must_use]
    pub fn after(mut self, ts: DateTime<Utc>) -> Self {
        self.after = Some(ts);
        self
    }

    /// Only records strictly older than `ts`.
    #[must_use]
    pub fn before(mut self, ts: DateTime<Utc>) -> Self {
        self.before = Some(ts);
        self
    }

    /// Cap the result size.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn log_level_numeric() {
        assert_eq!(LogLevel::Debug.as_num(), 0);
        assert_eq!(LogLevel::Info.as_num(), 1);
        assert_eq!(LogLevel::Warn.as_num(), 2);
        assert_eq!(LogLevel::Error.as_num(), 3);
    }

    #[test]
    fn log_level_padded_names_are_five_wide() {
        for level in LogLevel::ALL {
            assert_eq!(level.padded_name().len(), 5);
            assert!(level.padded_name().starts_with(level.name()));
        }
    }

    #[test]
    fn log_level_from_str_case_insensitive() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" error ".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("2".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }

    #[test]
    fn log_level_rejects_unknown() {
        assert_matches!(
            "verbose".parse::<LogLevel>(),
            Err(LogSinkError::InvalidLevel(name)) if name == "verbose"
        );
        assert_matches!("7".parse::<LogLevel>(), Err(LogSinkError::InvalidLevel(_)));
        assert_matches!(LogLevel::try_from(-1), Err(LogSinkError::InvalidLevel(_)));
    }

    #[test]
    fn log_level_serde() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let back: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, LogLevel::Error);
    }

    #[test]
    fn log_record_omits_absent_data() {
        let record = LogRecord {
            id: 1,
            ctx: "req-1".into(),
            level: LogLevel::Info,
            msg: "hello".into(),
            data: None,
            ctime: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["level"], "info");
        assert_eq!(json["ctx"], "req-1");
    }

    #[test]
    fn parse_levels_drops_garbage() {
        let levels = MessageFilter::parse_levels(["0", "warn", "x", "", "3"]);
        assert_eq!(levels, vec![0, 2, 3]);
    }

    #[test]
    fn parse_levels_all_invalid_is_empty() {
        assert!(MessageFilter::parse_levels(["nope", "1.5"]).is_empty());
    }

    #[test]
    fn filter_builder() {
        let filter = MessageFilter::new()
            .levels([LogLevel::Warn, LogLevel::Error])
            .ctxs(["a", "b"])
            .limit(5);
        assert_eq!(filter.levels, vec![2, 3]);
        assert_eq!(filter.ctxs, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(filter.limit, Some(5));
        assert!(filter.after.is_none());
    }
}
