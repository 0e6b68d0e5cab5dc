//! # logsink
//!
//! Command-line access to a log store: query records, append one, or run a
//! retention pass by hand.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use logsink::writer::format_line;
use logsink::{LogLevel, LogRecord, LogStore, LogStoreConfig, MessageFilter};
use tracing::debug;

/// Query and maintain a logsink database.
#[derive(Parser, Debug)]
#[command(name = "logsink", about = "Query and maintain a logsink database")]
struct Cli {
    /// Settings file (defaults to `~/.logsink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Database path (overrides settings).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print stored records, newest first.
    Query {
        /// Level to include (name or number); repeatable.
        #[arg(long = "level")]
        levels: Vec<String>,
        /// Context to include; repeatable.
        #[arg(long = "ctx")]
        ctxs: Vec<String>,
        /// Only records after this RFC 3339 timestamp.
        #[arg(long)]
        after: Option<String>,
        /// Only records before this RFC 3339 timestamp.
        #[arg(long)]
        before: Option<String>,
        /// Maximum number of records.
        #[arg(long)]
        limit: Option<usize>,
        /// Emit one JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Append one record.
    Write {
        /// Context tag.
        #[arg(long)]
        ctx: String,
        /// Severity (defaults to the configured default level).
        #[arg(long)]
        level: Option<String>,
        /// JSON payload.
        #[arg(long)]
        data: Option<String>,
        /// Message text.
        msg: String,
    },
    /// Delete expired records and compact the database.
    Purge {
        /// Maximum age in milliseconds (defaults to the configured value).
        #[arg(long)]
        max_age_ms: Option<u64>,
    },
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp: {raw}"))?;
    Ok(ts.with_timezone(&Utc))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn build_filter(
    levels: &[String],
    ctxs: Vec<String>,
    after: Option<&str>,
    before: Option<&str>,
    limit: Option<usize>,
) -> Result<MessageFilter> {
    Ok(MessageFilter {
        levels: MessageFilter::parse_levels(levels),
        ctxs,
        after: after.map(parse_timestamp).transpose()?,
        before: before.map(parse_timestamp).transpose()?,
        limit,
    })
}

fn render(record: &LogRecord, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(record)?)
    } else {
        let line = format_line(record.level, &record.ctime, &record.ctx, &record.msg);
        Ok(line.trim_end().to_string())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => logsink::load_settings_from_path(path),
        None => logsink::load_settings(),
    }
    .context("Failed to load settings")?;
    if let Some(db) = cli.db {
        settings.path = db;
    }

    logsink::init_subscriber("warn");

    if settings.path != logsink::MEMORY_PATH {
        ensure_parent_dir(Path::new(&settings.path))?;
    }

    // Retention only runs when asked for explicitly.
    let config = LogStoreConfig::from(&settings).max_age(Duration::ZERO);
    let store = LogStore::open(config)
        .with_context(|| format!("Failed to open log store at {}", settings.path))?;

    match cli.command {
        Command::Query {
            levels,
            ctxs,
            after,
            before,
            limit,
            json,
        } => {
            let filter = build_filter(&levels, ctxs, after.as_deref(), before.as_deref(), limit)?;
            let records = store.get_messages(&filter)?;
            debug!(count = records.len(), "query returned");
            for record in records {
                println!("{}", render(&record, json)?);
            }
        }
        Command::Write {
            ctx,
            level,
            data,
            msg,
        } => {
            let level: LogLevel = level
                .as_deref()
                .unwrap_or(&settings.default_level)
                .parse()?;
            let payload = data
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()
                .context("--data must be valid JSON")?;
            let logger = store.get_logger(&ctx, Some(LogLevel::Debug));
            logger.log(level, &msg, payload.as_ref())?;
            debug!(%ctx, %level, "record written");
        }
        Command::Purge { max_age_ms } => {
            let max_age_ms = max_age_ms.unwrap_or(settings.max_age_ms);
            if max_age_ms == 0 {
                bail!("retention is disabled (max age 0); pass --max-age-ms to purge");
            }
            let report = store.purge(Duration::from_millis(max_age_ms))?;
            println!(
                "deleted {} record(s) older than {}",
                report.deleted,
                report.cutoff.to_rfc3339()
            );
        }
    }

    store.close();
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_filters() {
        let cli = Cli::try_parse_from([
            "logsink", "--db", "x.db", "query", "--level", "warn", "--level", "3", "--ctx", "a",
            "--limit", "5",
        ])
        .unwrap();
        assert_eq!(cli.db.as_deref(), Some("x.db"));
        let Command::Query {
            levels,
            ctxs,
            limit,
            json,
            ..
        } = cli.command
        else {
            panic!("expected query");
        };
        assert_eq!(levels, vec!["warn", "3"]);
        assert_eq!(ctxs, vec!["a"]);
        assert_eq!(limit, Some(5));
        assert!(!json);
    }

    #[test]
    fn filter_drops_unparseable_levels() {
        let filter = build_filter(
            &["error".to_string(), "loud".to_string()],
            vec![],
            Some("2025-01-01T00:00:00Z"),
            None,
            None,
        )
        .unwrap();
        assert_eq!(filter.levels, vec![3]);
        assert!(filter.after.is_some());
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let err = build_filter(&[], vec![], None, Some("tomorrow"), None).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp: tomorrow"));
    }

    #[test]
    fn write_then_query_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.db");
        ensure_parent_dir(&path).unwrap();
        let store = LogStore::open(
            LogStoreConfig::new(path.to_str().unwrap()).max_age(Duration::ZERO),
        )
        .unwrap();
        store
            .get_logger("cli", None)
            .info_with("hello", &serde_json::json!({"k": 1}))
            .unwrap();

        let records = store.get_messages(&MessageFilter::default()).unwrap();
        let plain = render(&records[0], false).unwrap();
        assert!(plain.starts_with("INFO  ["));
        assert!(plain.ends_with("[cli] hello"));

        let json = render(&records[0], true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["data"]["k"], 1);
        assert_eq!(value["level"], "info");
    }
}
