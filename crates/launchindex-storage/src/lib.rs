//! launchindex-storage: storage backends for LaunchIndex.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Every backend implements the three core traits: `CheckpointStore`,
//! `RawEventStore` and `LaunchStore`.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStorage};

use launchindex_core::error::IndexerError;
use launchindex_core::payload::Amount;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// Amounts are stored as decimal TEXT; parse one back.
pub(crate) fn parse_amount(column: &str, value: &str) -> Result<Amount, IndexerError> {
    value
        .parse()
        .map_err(|e| IndexerError::Storage(format!("column {column}: {e}")))
}

/// Add `delta` to `current`, failing instead of wrapping.
pub(crate) fn add_amount(
    token: &str,
    current: Amount,
    delta: Amount,
) -> Result<Amount, IndexerError> {
    current.checked_add(delta).ok_or_else(|| {
        IndexerError::handler(
            "ContributionMade",
            format!("counter overflow on launch {token}"),
        )
    })
}
