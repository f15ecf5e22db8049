//! Local cache store: SQLite bootstrap, schema migrations and typed entries.
//!
//! # Responsibility
//! - Open and configure SQLite connections backing the task cache.
//! - Apply schema migrations in deterministic order.
//! - Expose one typed load/save/clear surface per cache key.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Cache data version is tracked separately in `cache_meta`.
//! - Reads never fail on malformed stored content (self-healing).

use std::error::Error;
use std::fmt::{Display, Formatter};

mod cache;
pub mod migrations;
mod open;

pub use cache::{CacheKey, LocalCacheStore, CACHE_DATA_VERSION};
pub use open::{open_cache, open_cache_in_memory};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Encode(serde_json::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode cache entry: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "cache schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}
