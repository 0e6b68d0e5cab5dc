//! # logsink
//!
//! Durable, queryable logging sink backed by `SQLite`.
//!
//! - [`LogStore`] owns the database and the retention task
//! - [`Logger`] handles write context-tagged, level-gated records
//! - [`LogStore::get_messages`] reads them back through a [`MessageFilter`]
//! - [`retention`] deletes records past their maximum age and vacuums
//!
//! Internal diagnostics go through `tracing`; see [`init_subscriber`].

#![deny(unsafe_code)]

pub mod errors;
pub mod logger;
pub mod query;
pub mod retention;
pub mod settings;
pub mod sqlite;
pub mod store;
pub mod types;
pub mod writer;

pub use errors::{LogSinkError, Result, StorageError};
pub use logger::Logger;
pub use retention::{PurgeReport, RetentionPolicy};
pub use settings::{LogSinkSettings, load_settings, load_settings_from_path};
pub use sqlite::{ConnectionConfig, MEMORY_PATH};
pub use store::{LogStore, LogStoreConfig};
pub use types::{LogLevel, LogRecord, MessageFilter};
pub use writer::SideChannel;

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup; later calls are no-ops. `RUST_LOG` overrides
/// `level` when set.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
