//! SQL composition for filtered message reads.
//!
//! [`build_select`] turns a [`MessageFilter`] into a parameterised `SELECT`
//! over the `logs` table. Results are always ordered newest first, with `id`
//! as a tiebreaker for records sharing a millisecond.

use std::fmt::Write as _;

use chrono::{DateTime, Datelike, SecondsFormat, SubsecRound, TimeDelta, Utc};
use rusqlite::types::Value;

use crate::types::MessageFilter;

/// Column list shared by every record read.
pub(crate) const RECORD_COLUMNS: &str = "id, ctx, level, msg, data, ctime";

/// Render a timestamp in the stored `ctime` format.
pub fn format_ctime(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Where a timestamp falls relative to the text `ctime` column.
///
/// Stored values always carry a four-digit year, so text comparison only
/// orders correctly for bounds inside years 0000..=9999.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CtimeBound {
    /// Earlier than any storable `ctime`.
    BelowAll,
    /// Comparable as text.
    Text(String),
    /// Later than any storable `ctime`.
    AboveAll,
}

pub(crate) fn ctime_bound(ts: &DateTime<Utc>) -> CtimeBound {
    match ts.year() {
        y if y < 0 => CtimeBound::BelowAll,
        y if y > 9999 => CtimeBound::AboveAll,
        _ => CtimeBound::Text(format_ctime(ts)),
    }
}

/// Millisecond bound at or below `ts`, for exclusive lower bounds.
fn floor_ms(ts: &DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Millisecond bound at or above `ts`, for exclusive upper bounds.
pub(crate) fn ceil_ms(ts: &DateTime<Utc>) -> DateTime<Utc> {
    let floor = ts.trunc_subsecs(3);
    if floor < *ts {
        floor + TimeDelta::milliseconds(1)
    } else {
        floor
    }
}

/// Build the `SELECT` statement and its positional parameters.
pub fn build_select(filter: &MessageFilter) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM logs WHERE 1=1");
    let mut params: Vec<Value> = Vec::new();

    if !filter.levels.is_empty() {
        let _ = write!(sql, " AND level IN ({})", placeholders(filter.levels.len()));
        params.extend(filter.levels.iter().map(|l| Value::Integer(*l)));
    }
    if !filter.ctxs.is_empty() {
        let _ = write!(sql, " AND ctx IN ({})", placeholders(filter.ctxs.len()));
        params.extend(filter.ctxs.iter().map(|c| Value::Text(c.clone())));
    }
    if let Some(after) = filter.after {
        match ctime_bound(&floor_ms(&after)) {
            CtimeBound::BelowAll => {}
            CtimeBound::Text(bound) => {
                sql.push_str(" AND ctime > ?");
                params.push(Value::Text(bound));
            }
            CtimeBound::AboveAll => sql.push_str(" AND 0"),
        }
    }
    if let Some(before) = filter.before {
        match ctime_bound(&ceil_ms(&before)) {
            CtimeBound::BelowAll => sql.push_str(" AND 0"),
            CtimeBound::Text(bound) => {
                sql.push_str(" AND ctime < ?");
                params.push(Value::Text(bound));
            }
            CtimeBound::AboveAll => {}
        }
    }

    sql.push_str(" ORDER BY ctime DESC, id DESC");

    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    (sql, params)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
