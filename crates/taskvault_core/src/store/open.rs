//! Connection bootstrap for the cache database.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Apply schema migrations and the cache data-version upgrade.
//!
//! # Invariants
//! - Returned stores have every schema migration applied.
//! - Returned stores carry the current `CACHE_DATA_VERSION` marker.

use super::cache::LocalCacheStore;
use super::migrations::apply_migrations;
use super::{StoreError, StoreResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens (or creates) the cache database at `path`.
///
/// # Side effects
/// - Creates missing parent directories.
/// - Emits `cache_open` logging events with duration and status.
pub fn open_cache(path: impl AsRef<Path>) -> StoreResult<LocalCacheStore> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            error!(
                "event=cache_open module=store status=error mode=file error_code=cache_dir_failed error={}",
                err
            );
        }
    }
    open_with("file", || Connection::open(path))
}

/// Opens a throwaway in-memory cache, used by tests and ephemeral sessions.
pub fn open_cache_in_memory() -> StoreResult<LocalCacheStore> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> StoreResult<LocalCacheStore> {
    let started_at = Instant::now();
    info!("event=cache_open module=store status=start mode={mode}");

    let result = connect()
        .map_err(StoreError::from)
        .and_then(|mut conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            apply_migrations(&mut conn)?;
            LocalCacheStore::from_migrated(conn)
        });

    match &result {
        Ok(_) => info!(
            "event=cache_open module=store status=ok mode={} duration_ms={}",
            mode,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=cache_open module=store status=error mode={} duration_ms={} error_code=cache_bootstrap_failed error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}
