//! Task domain model.
//!
//! # Responsibility
//! - Define the cached task record and its identifier space.
//! - Provide validation and lifecycle helpers for optimistic updates.
//!
//! # Invariants
//! - `title` is never blank after trimming.
//! - `TaskId::Local` values always start with `TEMP_ID_PREFIX`.
//! - `pending_sync` is `true` for every task carrying a `TaskId::Local`,
//!   except the short window of an online create that has not returned yet.

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Reserved prefix for client-generated identifiers.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Server-assigned task identifier.
pub type ServerId = i64;

/// Identity of a task in the local cache.
///
/// Serialized as a JSON number for server ids and a JSON string for
/// temporary ids, matching what the cache has always stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    /// Permanent identifier assigned by the remote store.
    Server(ServerId),
    /// Temporary identifier generated on this device.
    Local(String),
}

impl TaskId {
    /// Generates a fresh temporary identifier.
    pub fn new_local() -> Self {
        Self::Local(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns the server id when this task has been acknowledged.
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Local(value) => f.write_str(value),
        }
    }
}

impl FromStr for TaskId {
    type Err = TaskValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(id) = trimmed.parse::<ServerId>() {
            return Ok(Self::Server(id));
        }
        if is_valid_temp_id(trimmed) {
            return Ok(Self::Local(trimmed.to_string()));
        }
        Err(TaskValidationError::InvalidId(trimmed.to_string()))
    }
}

impl From<ServerId> for TaskId {
    fn from(value: ServerId) -> Self {
        Self::Server(value)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Server(id) => serializer.serialize_i64(*id),
            Self::Local(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(ServerId),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(id) => Ok(Self::Server(id)),
            RawId::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

fn is_valid_temp_id(value: &str) -> bool {
    value
        .strip_prefix(TEMP_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
}

/// Validation failures for task records and identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyTitle,
    InvalidId(String),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title cannot be empty"),
            Self::InvalidId(value) => write!(
                f,
                "invalid task id `{value}`; expected an integer or `{TEMP_ID_PREFIX}` prefix"
            ),
        }
    }
}

impl Error for TaskValidationError {}

/// Cached task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Serialized as `YYYY-MM-DD`, or `null` when absent.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    /// Local field values have not been confirmed by the remote store.
    #[serde(default)]
    pub pending_sync: bool,
}

impl Task {
    /// Creates a locally-originated task with a fresh temporary id.
    ///
    /// The title is stored trimmed. Callers reject blank titles before
    /// reaching this constructor; `validate()` catches the rest.
    pub fn new_local(title: &str, due_date: Option<NaiveDate>, pending_sync: bool) -> Self {
        Self {
            id: TaskId::new_local(),
            title: title.trim().to_string(),
            due_date,
            completed: false,
            pending_sync,
        }
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        if let TaskId::Local(value) = &self.id {
            if !is_valid_temp_id(value) {
                return Err(TaskValidationError::InvalidId(value.clone()));
            }
        }
        Ok(())
    }

    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }

    /// Returns the key used to match temporary tasks against server entries.
    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }

    /// Returns whether user-editable fields match `other`.
    pub fn same_fields(&self, other: &Task) -> bool {
        self.title == other.title
            && self.due_date == other.due_date
            && self.completed == other.completed
    }
}

/// Case-insensitive, whitespace-trimmed title key.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Transient delete failures tolerated before a queued delete is given up.
///
/// The backend answers a delete of an unknown id with a 500, which classifies
/// as transient.
pub const MAX_DELETE_ATTEMPTS: u32 = 5;

/// Remote delete that could not be sent yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelete {
    pub id: ServerId,
    /// Transient failures seen so far; absent in older caches.
    #[serde(default)]
    pub attempts: u32,
}

impl PendingDelete {
    pub fn new(id: ServerId) -> Self {
        Self { id, attempts: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_DELETE_ATTEMPTS
    }
}

/// Filter applied by list projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl TaskFilter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Completed => task.completed,
            Self::Pending => !task.completed,
        }
    }
}

impl FromStr for TaskFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "completed" | "done" => Ok(Self::Completed),
            "pending" | "open" => Ok(Self::Pending),
            other => Err(format!(
                "unsupported filter `{other}`; expected all|completed|pending"
            )),
        }
    }
}
