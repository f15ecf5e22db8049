use crate::model::profile::UserProfile;
use crate::model::task::{ServerId, Task, TaskId};
use crate::remote::RemoteResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Contract against the backing task collection.
///
/// Implementations attach the bearer token themselves and classify every
/// failure into a `RemoteError`.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list(&self) -> RemoteResult<Vec<Task>>;

    async fn create(&self, task: &NewTask) -> RemoteResult<Task>;

    async fn update(&self, id: ServerId, patch: &TaskPatch) -> RemoteResult<Task>;

    async fn delete(&self, id: ServerId) -> RemoteResult<()>;

    async fn fetch_profile(&self) -> RemoteResult<UserProfile>;
}

/// Task object as returned by the remote store.
///
/// Extra fields such as `created_at` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTask {
    pub id: ServerId,
    pub title: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

impl From<RemoteTask> for Task {
    fn from(value: RemoteTask) -> Self {
        Self {
            id: TaskId::Server(value.id),
            title: value.title,
            due_date: value.due_date,
            completed: value.completed,
            pending_sync: false,
        }
    }
}

/// `POST tasks/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub due_date: Option<NaiveDate>,
    /// Sent only when the task was completed before its first sync.
    #[serde(skip_serializing_if = "is_false")]
    pub completed: bool,
}

impl NewTask {
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            due_date: task.due_date,
            completed: task.completed,
        }
    }
}

/// `PATCH tasks/{id}/update/` body; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` clears the due date on the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn details(title: impl Into<String>, due_date: Option<NaiveDate>) -> Self {
        Self {
            title: Some(title.into()),
            due_date: Some(due_date),
            completed: None,
        }
    }

    /// Full field set, used when replaying offline edits.
    pub fn full(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            due_date: Some(task.due_date),
            completed: Some(task.completed),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
