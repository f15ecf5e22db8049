//! Optimistic task mutations.
//!
//! # Responsibility
//! - Apply add/toggle/edit/delete to memory and cache before any network call.
//! - Reconcile with the remote store when online; queue when offline.
//!
//! # Invariants
//! - Local state is committed before the first await of every mutation.
//! - Temporary-id tasks never reach `update`/`delete` on the remote store.
//! - `Unauthorized` always ends in a forced logout of the session that sent it.
//! - Failed toggle/edit revert memory and cache together.

use crate::model::profile::UserProfile;
use crate::model::task::{PendingDelete, Task, TaskFilter, TaskId};
use crate::remote::{NewTask, RemoteError, TaskPatch};
use crate::sync::context::{Ledger, SyncContext};
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// Result of one mutation, for callers that want to react to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Input rejected locally (blank title, unknown id); nothing changed.
    Ignored,
    /// Applied locally; the remote store never needs to hear about it.
    LocalOnly,
    /// Applied locally and left pending for the next reconnect.
    Queued,
    /// Applied locally and confirmed by the remote store.
    Confirmed,
    /// Remote call failed; the optimistic change was undone.
    Reverted(RemoteError),
    /// Remote create failed while online; the optimistic entry was removed.
    Dropped(RemoteError),
    /// Credential rejected, or a logout raced the call.
    LoggedOut,
}

/// Use-case facade for the presentation layer.
#[derive(Clone)]
pub struct TaskService {
    ctx: Arc<SyncContext>,
}

impl TaskService {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Current in-memory list in display order.
    pub fn tasks(&self) -> Vec<Task> {
        self.ctx.tasks()
    }

    /// Filtered projection of the current list.
    pub fn visible_tasks(&self, filter: TaskFilter) -> Vec<Task> {
        self.ctx.inspect(|ledger| {
            ledger
                .tasks
                .iter()
                .filter(|task| filter.matches(task))
                .cloned()
                .collect()
        })
    }

    pub fn pending_deletes(&self) -> Vec<PendingDelete> {
        self.ctx.pending_deletes()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.ctx.profile()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.ctx.subscribe()
    }

    pub fn logout(&self) {
        self.ctx.logout();
    }

    /// Enters edit mode for `id`; returns `false` for unknown ids.
    pub fn begin_edit(&self, id: &TaskId) -> bool {
        self.ctx.inspect(|ledger| {
            let exists = ledger.position(id).is_some();
            if exists {
                ledger.editing = Some(id.clone());
            }
            exists
        })
    }

    pub fn cancel_edit(&self) {
        self.ctx.inspect(|ledger| ledger.editing = None);
    }

    pub fn editing(&self) -> Option<TaskId> {
        self.ctx.inspect(|ledger| ledger.editing.clone())
    }

    /// Adds a task; blank titles are ignored.
    ///
    /// New tasks start pending so a crash mid-request still leaves them queued.
    /// Once online, any failure other than `Unauthorized` removes the entry.
    pub async fn add_task(&self, title: &str, due_date: Option<NaiveDate>) -> MutationOutcome {
        if title.trim().is_empty() {
            return MutationOutcome::Ignored;
        }

        let generation = self.ctx.generation();
        let online = self.ctx.is_online();
        let task = Task::new_local(title, due_date, true);
        let committed = self.ctx.commit(generation, |ledger| {
            ledger.tasks.push(task.clone());
            if online {
                ledger.in_flight.insert(task.id.clone());
            }
        });
        if committed.is_none() {
            return MutationOutcome::LoggedOut;
        }
        if !online {
            info!("event=task_add module=service status=queued task_id={}", task.id);
            return MutationOutcome::Queued;
        }

        let result = self.ctx.gateway().create(&NewTask::from_task(&task)).await;
        self.release(&task.id);
        match result {
            Ok(confirmed) => {
                info!(
                    "event=task_add module=service status=ok task_id={} server_id={}",
                    task.id, confirmed.id
                );
                self.finish(generation, MutationOutcome::Confirmed, |ledger| {
                    ledger.adopt_confirmed(&task, confirmed);
                })
            }
            Err(RemoteError::Unauthorized) => self.force_logout(generation),
            Err(err) => {
                warn!(
                    "event=task_add module=service status=dropped task_id={} error_code={}",
                    task.id,
                    err.code()
                );
                self.finish(generation, MutationOutcome::Dropped(err), |ledger| {
                    ledger.remove(&task.id);
                })
            }
        }
    }

    /// Deletes a task, rolling back if an online delete fails.
    pub async fn delete_task(&self, id: &TaskId) -> MutationOutcome {
        let generation = self.ctx.generation();
        let online = self.ctx.is_online();
        let removed = self
            .ctx
            .commit(generation, |ledger| {
                let removed = ledger.remove(id)?;
                if ledger.editing.as_ref() == Some(id) {
                    ledger.editing = None;
                }
                match (&removed.1.id, online) {
                    (TaskId::Server(server_id), false) => ledger.queue_delete(*server_id),
                    (TaskId::Server(_), true) => {
                        ledger.in_flight.insert(id.clone());
                    }
                    (TaskId::Local(_), _) => {}
                }
                Some(removed)
            })
            .flatten();

        let Some((index, task)) = removed else {
            return MutationOutcome::Ignored;
        };
        let Some(server_id) = task.id.server_id() else {
            info!("event=task_delete module=service status=ok task_id={id} scope=local");
            return MutationOutcome::LocalOnly;
        };
        if !online {
            info!("event=task_delete module=service status=queued task_id={server_id}");
            return MutationOutcome::Queued;
        }

        let result = self.ctx.gateway().delete(server_id).await;
        self.release(id);
        match result {
            Ok(()) => MutationOutcome::Confirmed,
            Err(err) if err.is_not_found() => {
                info!("event=task_delete module=service status=ok task_id={server_id} note=already_deleted");
                MutationOutcome::Confirmed
            }
            Err(RemoteError::Unauthorized) => self.force_logout(generation),
            Err(err) => {
                warn!(
                    "event=task_delete module=service status=reverted task_id={} error_code={}",
                    server_id,
                    err.code()
                );
                self.finish(generation, MutationOutcome::Reverted(err), |ledger| {
                    ledger.restore(index, task);
                })
            }
        }
    }

    /// Sets the completion flag.
    pub async fn toggle_complete(&self, id: &TaskId, completed: bool) -> MutationOutcome {
        self.apply_update(id, "task_toggle", |task| {
            let previous = task.completed;
            task.completed = completed;
            (
                TaskPatch::completed(completed),
                Box::new(move |task: &mut Task| task.completed = previous) as Undo,
            )
        })
        .await
    }

    /// Replaces title and due date; blank titles are ignored.
    ///
    /// Edit mode is cleared once the edit completes, whatever the outcome.
    pub async fn edit_task(
        &self,
        id: &TaskId,
        title: &str,
        due_date: Option<NaiveDate>,
    ) -> MutationOutcome {
        let title = title.trim();
        if title.is_empty() {
            return MutationOutcome::Ignored;
        }

        let new_title = title.to_string();
        let outcome = self
            .apply_update(id, "task_edit", |task| {
                let previous_title = std::mem::replace(&mut task.title, new_title.clone());
                let previous_due = std::mem::replace(&mut task.due_date, due_date);
                (
                    TaskPatch::details(new_title, due_date),
                    Box::new(move |task: &mut Task| {
                        task.title = previous_title;
                        task.due_date = previous_due;
                    }) as Undo,
                )
            })
            .await;
        self.cancel_edit();
        outcome
    }

    /// Shared toggle/edit flow.
    ///
    /// `change` mutates the task in place and returns the patch to send plus
    /// an undo closure used when the remote call fails.
    async fn apply_update(
        &self,
        id: &TaskId,
        event: &'static str,
        change: impl FnOnce(&mut Task) -> (TaskPatch, Undo),
    ) -> MutationOutcome {
        let generation = self.ctx.generation();
        let online = self.ctx.is_online();
        let prepared = self
            .ctx
            .commit(generation, |ledger| {
                let task = ledger.find_mut(id)?;
                let was_pending = task.pending_sync;
                let (patch, undo) = change(task);
                if task.is_temporary() || !online {
                    task.pending_sync = true;
                }
                let sent = task.clone();
                if online && !sent.is_temporary() {
                    ledger.in_flight.insert(id.clone());
                }
                // Earlier offline edits ride along so the server record we
                // adopt on success reflects every local field.
                let patch = if was_pending { TaskPatch::full(&sent) } else { patch };
                Some((sent, patch, undo))
            })
            .flatten();

        let Some((sent, patch, undo)) = prepared else {
            return MutationOutcome::Ignored;
        };
        let Some(server_id) = sent.id.server_id() else {
            info!("event={event} module=service status=ok task_id={id} scope=local");
            return MutationOutcome::LocalOnly;
        };
        if !online {
            info!("event={event} module=service status=queued task_id={server_id}");
            return MutationOutcome::Queued;
        }

        let result = self.ctx.gateway().update(server_id, &patch).await;
        self.release(id);
        match result {
            Ok(confirmed) => {
                info!("event={event} module=service status=ok task_id={server_id}");
                self.finish(generation, MutationOutcome::Confirmed, |ledger| {
                    ledger.adopt_confirmed(&sent, confirmed);
                })
            }
            Err(RemoteError::Unauthorized) => self.force_logout(generation),
            Err(err) => {
                warn!(
                    "event={} module=service status=reverted task_id={} error_code={}",
                    event,
                    server_id,
                    err.code()
                );
                self.finish(generation, MutationOutcome::Reverted(err), |ledger| {
                    revert_if_unchanged(ledger, &sent, undo);
                })
            }
        }
    }

    fn release(&self, id: &TaskId) {
        self.ctx.inspect(|ledger| ledger.in_flight.remove(id));
    }

    /// Commits the post-response change, or reports a logout that raced it.
    fn finish(
        &self,
        generation: u64,
        outcome: MutationOutcome,
        f: impl FnOnce(&mut Ledger),
    ) -> MutationOutcome {
        match self.ctx.commit(generation, f) {
            Some(()) => outcome,
            None => MutationOutcome::LoggedOut,
        }
    }

    /// Logs out the session that issued the call; a newer session is kept.
    fn force_logout(&self, generation: u64) -> MutationOutcome {
        warn!("event=unauthorized module=service status=error action=logout");
        self.ctx.logout_from(generation);
        MutationOutcome::LoggedOut
    }
}

type Undo = Box<dyn FnOnce(&mut Task) + Send>;

/// Undoes a failed change unless the user changed the task again meanwhile.
fn revert_if_unchanged(ledger: &mut Ledger, sent: &Task, undo: Undo) {
    if let Some(task) = ledger.find_mut(&sent.id) {
        if task.same_fields(sent) {
            undo(task);
        }
    }
}
