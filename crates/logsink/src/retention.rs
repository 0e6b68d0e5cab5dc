//! Age-based retention for stored records.
//!
//! [`RetentionTask`] runs [`purge_once`] on a Tokio task: once immediately,
//! then again `interval` after each pass finishes. Each pass deletes records
//! older than `max_age` and vacuums the database. The next pass is only
//! scheduled after the current one returns, so passes never overlap.
//!
//! The loop runs on the caller's Tokio runtime when there is one, and on a
//! dedicated thread otherwise.
//!
//! A failing pass is logged and the loop carries on. Cancelling the task stops
//! future passes; a pass already running on the blocking pool completes.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{LogSinkError, Result};
use crate::query::ceil_ms;
use crate::sqlite::LogDatabase;

/// Default maximum record age: 30 days.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default pause between passes: 24 hours.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long records are kept and how often expiry runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Records older than this are deleted. Zero disables retention.
    pub max_age: Duration,
    /// Pause between the end of one pass and the start of the next.
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl RetentionPolicy {
    /// Whether a background loop should run at all.
    pub fn is_enabled(&self) -> bool {
        !self.max_age.is_zero()
    }
}

/// Outcome of one retention pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurgeReport {
    /// Records with `ctime` before this instant were deleted.
    pub cutoff: DateTime<Utc>,
    /// Number of deleted records.
    pub deleted: usize,
}

/// Delete records older than `now - max_age`, then compact.
pub fn purge_once(db: &LogDatabase, max_age: Duration, now: DateTime<Utc>) -> Result<PurgeReport> {
    let cutoff = TimeDelta::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let deleted = db.delete_older_than(&ceil_ms(&cutoff))?;
    db.compact()?;
    Ok(PurgeReport { cutoff, deleted })
}

/// Where the loop is running.
#[derive(Debug)]
enum Worker {
    /// A task on the caller's Tokio runtime.
    Task(JoinHandle<()>),
    /// A dedicated thread driving its own current-thread runtime.
    Thread(std::thread::JoinHandle<()>),
}

/// Handle to the background retention loop.
pub struct RetentionTask {
    cancel: CancellationToken,
    worker: Option<Worker>,
}

impl RetentionTask {
    /// Start the loop. The first pass starts immediately.
    ///
    /// Inside a Tokio runtime the loop is spawned onto it. Otherwise it gets
    /// a `logsink-retention` thread with a private current-thread runtime.
    pub fn spawn(db: LogDatabase, policy: RetentionPolicy) -> Result<Self> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let worker = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Worker::Task(runtime.spawn(run_loop(db, policy, token))),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .map_err(LogSinkError::RetentionWorker)?;
                let thread = std::thread::Builder::new()
                    .name("logsink-retention".into())
                    .spawn(move || runtime.block_on(run_loop(db, policy, token)))
                    .map_err(LogSinkError::RetentionWorker)?;
                debug!("log retention running on dedicated thread");
                Worker::Thread(thread)
            }
        };

        Ok(Self {
            cancel,
            worker: Some(worker),
        })
    }

    /// Stop scheduling further passes.
    ///
    /// On a dedicated thread this waits for the loop to exit, which includes
    /// any pass already in flight.
    pub fn cancel(mut self) {
        self.stop();
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        match &self.worker {
            Some(Worker::Task(handle)) => handle.is_finished(),
            Some(Worker::Thread(handle)) => handle.is_finished(),
            None => true,
        }
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        match self.worker.take() {
            Some(Worker::Task(handle)) => handle.abort(),
            Some(Worker::Thread(handle)) => {
                if handle.join().is_err() {
                    error!("log retention thread panicked");
                }
            }
            None => {}
        }
    }
}

impl std::fmt::Debug for RetentionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.worker {
            Some(Worker::Task(_)) => "task",
            Some(Worker::Thread(_)) => "thread",
            None => "stopped",
        };
        f.debug_struct("RetentionTask")
            .field("mode", &mode)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for RetentionTask {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(db: LogDatabase, policy: RetentionPolicy, cancel: CancellationToken) {
    loop {
        let pass_db = db.clone();
        let max_age = policy.max_age;
        let pass = tokio::task::spawn_blocking(move || purge_once(&pass_db, max_age, Utc::now()));

        match pass.await {
            Ok(Ok(report)) if report.deleted > 0 => {
                info!(deleted = report.deleted, cutoff = %report.cutoff, "purged expired log records");
            }
            Ok(Ok(report)) => debug!(cutoff = %report.cutoff, "no expired log records"),
            Ok(Err(e)) => warn!(error = %e, "log retention pass failed"),
            Err(e) => error!(error = %e, "log retention pass panicked"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(policy.interval) => {}
        }
    }
    debug!("log retention stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::query::format_ctime;
    use crate::sqlite::{ConnectionConfig, MEMORY_PATH};
    use crate::types::{LogLevel, MessageFilter};

    fn memory_db() -> LogDatabase {
        LogDatabase::open(MEMORY_PATH, &ConnectionConfig::default()).unwrap()
    }

    fn insert_aged(db: &LogDatabase, msg: &str, age: TimeDelta) {
        let ctime = format_ctime(&(Utc::now() - age));
        let _ = db
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO logs (ctx, level, msg, ctime) VALUES ('ret', 1, ?1, ?2)",
                rusqlite::params![msg, ctime],
            )
            .unwrap();
    }

    fn messages(db: &LogDatabase) -> Vec<String> {
        db.select(&MessageFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.msg)
            .collect()
    }

    #[test]
    fn default_policy() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_age, Duration::from_millis(2_592_000_000));
        assert_eq!(policy.interval, Duration::from_millis(86_400_000));
        assert!(policy.is_enabled());
    }

    #[test]
    fn zero_max_age_disables() {
        let policy = RetentionPolicy {
            max_age: Duration::ZERO,
            ..Default::default()
        };
        assert!(!policy.is_enabled());
    }

    #[test]
    fn purge_removes_only_expired() {
        let db = memory_db();
        insert_aged(&db, "ancient", TimeDelta::days(40));
        insert_aged(&db, "stale", TimeDelta::days(31));
        insert_aged(&db, "recent", TimeDelta::days(2));
        let _ = db.insert("ret", LogLevel::Info, "fresh", None).unwrap();

        let now = Utc::now();
        let report = purge_once(&db, DEFAULT_MAX_AGE, now).unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.cutoff, now - TimeDelta::days(30));
        assert_eq!(messages(&db), vec!["fresh", "recent"]);
    }

    #[test]
    fn purge_with_huge_max_age_keeps_everything() {
        let db = memory_db();
        insert_aged(&db, "old", TimeDelta::days(365));
        let report = purge_once(&db, Duration::MAX, Utc::now()).unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn spawn_outside_runtime_uses_dedicated_thread() {
        let db = memory_db();
        insert_aged(&db, "expired", TimeDelta::days(2));
        insert_aged(&db, "kept", TimeDelta::minutes(1));

        let task = RetentionTask::spawn(
            db.clone(),
            RetentionPolicy {
                max_age: Duration::from_secs(24 * 60 * 60),
                interval: Duration::from_millis(20),
            },
        )
        .unwrap();
        assert_matches!(task.worker, Some(Worker::Thread(_)));
        assert!(format!("{task:?}").contains("thread"));

        let mut remaining = db.count().unwrap();
        for _ in 0..100 {
            if remaining == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
            remaining = db.count().unwrap();
        }
        assert_eq!(remaining, 1);
        assert_eq!(messages(&db), vec!["kept"]);
        assert!(!task.is_finished());

        let cancel = task.cancel.clone();
        task.cancel();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn dropping_thread_worker_joins_it() {
        let task = RetentionTask::spawn(
            memory_db(),
            RetentionPolicy {
                max_age: Duration::from_secs(60),
                interval: Duration::from_secs(3600),
            },
        )
        .unwrap();
        let cancel = task.cancel.clone();
        drop(task);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn spawn_inside_runtime_uses_a_task() {
        let task = RetentionTask::spawn(
            memory_db(),
            RetentionPolicy {
                max_age: Duration::from_secs(60),
                interval: Duration::from_secs(3600),
            },
        )
        .unwrap();
        assert_matches!(task.worker, Some(Worker::Task(_)));
        task.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_pass_runs_immediately() {
        let db = memory_db();
        insert_aged(&db, "expired", TimeDelta::days(2));
        insert_aged(&db, "kept", TimeDelta::minutes(1));

        let task = RetentionTask::spawn(
            db.clone(),
            RetentionPolicy {
                max_age: Duration::from_secs(24 * 60 * 60),
                interval: Duration::from_secs(3600),
            },
        )
        .unwrap();

        let mut remaining = db.count().unwrap();
        for _ in 0..100 {
            if remaining == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            remaining = db.count().unwrap();
        }
        assert_eq!(remaining, 1);
        assert_eq!(messages(&db), vec!["kept"]);
        task.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_reschedules_after_each_pass() {
        let db = memory_db();
        let task = RetentionTask::spawn(
            db.clone(),
            RetentionPolicy {
                max_age: Duration::from_secs(60),
                interval: Duration::from_millis(30),
            },
        )
        .unwrap();

        // Let the first pass finish, then age a record in behind it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        insert_aged(&db, "late", TimeDelta::minutes(5));

        let mut remaining = db.count().unwrap();
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            remaining = db.count().unwrap();
        }
        assert_eq!(remaining, 0);
        task.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_pass_does_not_stop_loop() {
        let db = memory_db();
        db.conn().unwrap().execute_batch("DROP TABLE logs;").unwrap();

        let task = RetentionTask::spawn(
            db.clone(),
            RetentionPolicy {
                max_age: Duration::from_secs(60),
                interval: Duration::from_millis(20),
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        // Restore the table; the next pass succeeds.
        crate::sqlite::schema::ensure_schema(&db.conn().unwrap(), false).unwrap();
        insert_aged(&db, "expired", TimeDelta::minutes(5));
        let mut remaining = db.count().unwrap();
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            remaining = db.count().unwrap();
        }
        assert_eq!(remaining, 0);
        task.cancel();
    }

    #[tokio::test]
    async fn cancel_stops_the_loop() {
        let task = RetentionTask::spawn(
            memory_db(),
            RetentionPolicy {
                max_age: Duration::from_secs(60),
                interval: Duration::from_secs(3600),
            },
        )
        .unwrap();
        let cancel = task.cancel.clone();
        task.cancel();
        assert!(cancel.is_cancelled());
    }
}
