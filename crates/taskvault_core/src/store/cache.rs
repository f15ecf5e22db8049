//! Typed key-value cache over SQLite.
//!
//! # Responsibility
//! - Persist the task list, pending-delete queue and profile summary.
//! - Heal corrupted entries instead of propagating parse failures.
//! - Run the one-time cache data-version upgrade.
//!
//! # Invariants
//! - `save` replaces the whole value of a key in one statement.
//! - `load` never fails; malformed values read as empty and are removed.

use crate::model::profile::UserProfile;
use crate::model::task::{PendingDelete, Task};
use crate::store::StoreResult;
use log::{error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Current layout/semantics version of cached values.
///
/// Version 1 caches predate `pending_sync` tracking; upgrading from them keeps
/// only tasks that still need to reach the server.
pub const CACHE_DATA_VERSION: u32 = 2;

const DATA_VERSION_META_KEY: &str = "data_version";

/// Fixed cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    Tasks,
    PendingDeletes,
    UserProfile,
}

impl CacheKey {
    pub const ALL: [CacheKey; 3] = [Self::Tasks, Self::PendingDeletes, Self::UserProfile];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "taskvault_tasks",
            Self::PendingDeletes => "taskvault_pending_deletes",
            Self::UserProfile => "taskvault_user",
        }
    }
}

/// Durable task cache backed by one SQLite connection.
pub struct LocalCacheStore {
    conn: Connection,
}

impl LocalCacheStore {
    /// Wraps a connection whose schema migrations already ran.
    pub(crate) fn from_migrated(conn: Connection) -> StoreResult<Self> {
        let store = Self { conn };
        store.upgrade_data_version()?;
        Ok(store)
    }

    /// Loads a sequence stored under `key`.
    ///
    /// Missing keys, storage errors and malformed values all read as empty.
    /// Malformed values are cleared so the next read starts clean.
    pub fn load<T: DeserializeOwned>(&self, key: CacheKey) -> Vec<T> {
        self.load_value::<Vec<T>>(key).unwrap_or_default()
    }

    /// Replaces the sequence stored under `key`.
    pub fn save<T: Serialize>(&self, key: CacheKey, items: &[T]) -> StoreResult<()> {
        self.save_value(key, &items)
    }

    /// Removes one key.
    pub fn clear(&self, key: CacheKey) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1;",
            [key.as_str()],
        )?;
        Ok(())
    }

    /// Removes every cached entry. The data-version marker is kept.
    pub fn clear_all(&self) -> StoreResult<()> {
        self.conn.execute("DELETE FROM cache_entries;", [])?;
        info!("event=cache_clear module=store status=ok scope=all");
        Ok(())
    }

    pub fn load_tasks(&self) -> Vec<Task> {
        let tasks: Vec<Task> = self.load(CacheKey::Tasks);
        let before = tasks.len();
        let valid: Vec<Task> = tasks
            .into_iter()
            .filter(|task| task.validate().is_ok())
            .collect();
        if valid.len() != before {
            warn!(
                "event=cache_read module=store status=healed key={} dropped={}",
                CacheKey::Tasks.as_str(),
                before - valid.len()
            );
        }
        valid
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> StoreResult<()> {
        self.save(CacheKey::Tasks, tasks)
    }

    pub fn load_pending_deletes(&self) -> Vec<PendingDelete> {
        self.load(CacheKey::PendingDeletes)
    }

    pub fn save_pending_deletes(&self, records: &[PendingDelete]) -> StoreResult<()> {
        self.save(CacheKey::PendingDeletes, records)
    }

    pub fn load_profile(&self) -> Option<UserProfile> {
        self.load_value(CacheKey::UserProfile)
    }

    pub fn save_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        self.save_value(CacheKey::UserProfile, profile)
    }

    pub fn clear_profile(&self) -> StoreResult<()> {
        self.clear(CacheKey::UserProfile)
    }

    /// Returns the stored cache data-version marker.
    pub fn data_version(&self) -> StoreResult<Option<u32>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1;",
                [DATA_VERSION_META_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|value| value.parse().ok()))
    }

    fn load_value<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let raw = match self.read_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                error!(
                    "event=cache_read module=store status=error key={} error={}",
                    key.as_str(),
                    err
                );
                return None;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    "event=cache_read module=store status=healed key={} error_code=malformed_entry error={}",
                    key.as_str(),
                    err
                );
                if let Err(clear_err) = self.clear(key) {
                    error!(
                        "event=cache_clear module=store status=error key={} error={}",
                        key.as_str(),
                        clear_err
                    );
                }
                None
            }
        }
    }

    fn save_value<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> StoreResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO cache_entries (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key.as_str(), encoded],
        )?;
        Ok(())
    }

    fn read_raw(&self, key: CacheKey) -> StoreResult<Option<String>> {
        let raw = self
            .conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1;",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn write_data_version(&self, version: u32) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![DATA_VERSION_META_KEY, version.to_string()],
        )?;
        Ok(())
    }

    fn upgrade_data_version(&self) -> StoreResult<()> {
        let stored = self.data_version()?;
        let has_tasks = self.read_raw(CacheKey::Tasks)?.is_some();

        match stored {
            Some(version) if version >= CACHE_DATA_VERSION => {
                if version > CACHE_DATA_VERSION {
                    warn!(
                        "event=cache_data_upgrade module=store status=skipped stored={} current={}",
                        version, CACHE_DATA_VERSION
                    );
                }
                return Ok(());
            }
            None if !has_tasks => return self.write_data_version(CACHE_DATA_VERSION),
            _ => {}
        }

        let tasks: Vec<Task> = self.load(CacheKey::Tasks);
        let before = tasks.len();
        let kept: Vec<Task> = tasks.into_iter().filter(|task| task.pending_sync).collect();
        self.save_tasks(&kept)?;
        self.write_data_version(CACHE_DATA_VERSION)?;

        info!(
            "event=cache_data_upgrade module=store status=ok from={} to={} kept={} discarded={}",
            stored.unwrap_or(0),
            CACHE_DATA_VERSION,
            kept.len(),
            before - kept.len()
        );
        Ok(())
    }
}
