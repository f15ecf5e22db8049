//! Reconciliation protocol between the local cache and the remote store.
//!
//! # Responsibility
//! - Flush queued deletes, then queued creates/edits, then pull and merge.
//! - Run a pull-only pass on initial load.
//! - Serialize passes through the run gate.
//!
//! # Invariants
//! - Per-item failures never abort the rest of a flush.
//! - `Unauthorized` forces logout and aborts the pass.
//! - A failed pull leaves the cached view in place.
//! - Initial load never flushes queues.

use crate::model::task::{Task, MAX_DELETE_ATTEMPTS};
use crate::remote::{NewTask, RemoteError, TaskPatch};
use crate::sync::context::{Adoption, Ledger, SyncContext};
use crate::sync::gate::SyncTrigger;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub trigger: Option<SyncTrigger>,
    /// Pending deletes confirmed by the remote store.
    pub deletes_sent: usize,
    /// Pending deletes dropped because the remote store refused them.
    pub deletes_dropped: usize,
    /// Pending deletes kept for the next pass.
    pub deletes_retained: usize,
    pub created: usize,
    pub updated: usize,
    /// Pending tasks still waiting after this pass.
    pub still_pending: usize,
    /// Number of tasks in the view after a successful pull.
    pub merged: Option<usize>,
    pub pull_error: Option<RemoteError>,
}

/// Why a pass did not talk to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    NoToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was running; this trigger runs right after it.
    Queued,
    /// `load_and_sync` already ran for this mount.
    AlreadyLoaded,
    Skipped(SkipReason),
    /// The credential was rejected, or a logout interrupted the pass.
    LoggedOut,
}

/// A pass stopped early because the session ended.
struct SessionEnded;

type PassResult<T> = Result<T, SessionEnded>;

/// Drives reconciliation passes over a shared `SyncContext`.
#[derive(Clone)]
pub struct SyncOrchestrator {
    ctx: Arc<SyncContext>,
}

impl SyncOrchestrator {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Initial load: runs once per mount.
    ///
    /// The cached view is already published when this is called; the pass
    /// only pulls and merges (plus a profile refresh), never flushes queues.
    pub async fn load_and_sync(&self) -> SyncOutcome {
        if !self.ctx.mount() {
            return SyncOutcome::AlreadyLoaded;
        }
        self.run(SyncTrigger::InitialLoad).await
    }

    /// Full flush-then-pull pass, bound to the offline→online edge.
    pub async fn on_connectivity_restored(&self) -> SyncOutcome {
        self.run(SyncTrigger::Reconnect).await
    }

    /// Feeds the connectivity signal; reconciles on the offline→online edge.
    pub async fn set_online(&self, online: bool) -> Option<SyncOutcome> {
        let was_online = self.ctx.swap_online(online);
        info!("event=connectivity module=sync status=ok online={online} was_online={was_online}");
        if online && !was_online {
            Some(self.on_connectivity_restored().await)
        } else {
            None
        }
    }

    async fn run(&self, trigger: SyncTrigger) -> SyncOutcome {
        let Some(mut lease) = self.ctx.gate().try_enter(trigger) else {
            info!("event=sync_pass module=sync status=queued trigger={trigger:?}");
            return SyncOutcome::Queued;
        };

        let outcome = self.pass(trigger).await;
        while let Some(queued) = lease.next() {
            let follow_up = self.pass(queued).await;
            if follow_up == SyncOutcome::LoggedOut {
                break;
            }
        }
        outcome
    }

    async fn pass(&self, trigger: SyncTrigger) -> SyncOutcome {
        if !self.ctx.has_token() {
            info!("event=sync_pass module=sync status=skipped trigger={trigger:?} reason=no_token");
            return SyncOutcome::Skipped(SkipReason::NoToken);
        }
        if !self.ctx.is_online() {
            info!("event=sync_pass module=sync status=skipped trigger={trigger:?} reason=offline");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }

        let started_at = Instant::now();
        let generation = self.ctx.generation();
        let mut report = SyncReport {
            trigger: Some(trigger),
            ..SyncReport::default()
        };
        info!("event=sync_pass module=sync status=start trigger={trigger:?}");

        let result = match trigger {
            SyncTrigger::InitialLoad => self.initial_steps(generation, &mut report).await,
            SyncTrigger::Reconnect => self.reconnect_steps(generation, &mut report).await,
        };
        if result.is_err() {
            warn!(
                "event=sync_pass module=sync status=aborted trigger={trigger:?} reason=session_ended duration_ms={}",
                started_at.elapsed().as_millis()
            );
            return SyncOutcome::LoggedOut;
        }

        report.still_pending = self
            .ctx
            .inspect(|ledger| ledger.tasks.iter().filter(|task| task.pending_sync).count());
        info!(
            "event=sync_pass module=sync status=ok trigger={:?} duration_ms={} deletes_sent={} deletes_dropped={} deletes_retained={} created={} updated={} still_pending={} merged={:?} pull_error={}",
            trigger,
            started_at.elapsed().as_millis(),
            report.deletes_sent,
            report.deletes_dropped,
            report.deletes_retained,
            report.created,
            report.updated,
            report.still_pending,
            report.merged,
            report.pull_error.as_ref().map_or("none", RemoteError::code)
        );
        SyncOutcome::Completed(report)
    }

    async fn initial_steps(&self, generation: u64, report: &mut SyncReport) -> PassResult<()> {
        self.pull_and_merge(generation, report).await?;
        self.refresh_profile(generation).await
    }

    async fn reconnect_steps(&self, generation: u64, report: &mut SyncReport) -> PassResult<()> {
        self.flush_deletes(generation, report).await?;
        self.flush_pending(generation, report).await?;
        self.pull_and_merge(generation, report).await
    }

    async fn flush_deletes(&self, generation: u64, report: &mut SyncReport) -> PassResult<()> {
        let queued = self.ctx.inspect(|ledger| ledger.pending_deletes.clone());

        for record in queued {
            match self.ctx.gateway().delete(record.id).await {
                Ok(()) => {
                    self.commit(generation, |ledger| ledger.drop_delete(record.id))?;
                    report.deletes_sent += 1;
                }
                Err(RemoteError::Unauthorized) => return Err(self.end_session(generation)),
                Err(err) if err.is_transient() => {
                    let dropped =
                        self.commit(generation, |ledger| ledger.record_delete_failure(record.id))?;
                    if dropped {
                        warn!(
                            "event=flush_delete module=sync status=dropped task_id={} error_code={} reason=attempts_exhausted attempts={}",
                            record.id,
                            err.code(),
                            MAX_DELETE_ATTEMPTS
                        );
                        report.deletes_dropped += 1;
                    } else {
                        warn!(
                            "event=flush_delete module=sync status=retained task_id={} error_code={} attempts={}",
                            record.id,
                            err.code(),
                            record.attempts + 1
                        );
                        report.deletes_retained += 1;
                    }
                }
                Err(err) => {
                    // Already gone or refused: retrying cannot help.
                    warn!(
                        "event=flush_delete module=sync status=dropped task_id={} error={}",
                        record.id, err
                    );
                    self.commit(generation, |ledger| ledger.drop_delete(record.id))?;
                    report.deletes_dropped += 1;
                }
            }
        }
        Ok(())
    }

    async fn flush_pending(&self, generation: u64, report: &mut SyncReport) -> PassResult<()> {
        let pending: Vec<Task> = self.ctx.inspect(|ledger| {
            ledger
                .tasks
                .iter()
                .filter(|task| task.pending_sync && !ledger.in_flight.contains(&task.id))
                .cloned()
                .collect()
        });
        let (fresh, edited): (Vec<Task>, Vec<Task>) =
            pending.into_iter().partition(Task::is_temporary);

        for sent in fresh {
            let result = self.ctx.gateway().create(&NewTask::from_task(&sent)).await;
            if self.settle(generation, &sent, result)? {
                report.created += 1;
            }
        }

        for sent in edited {
            let Some(id) = sent.id.server_id() else {
                continue;
            };
            let result = self.ctx.gateway().update(id, &TaskPatch::full(&sent)).await;
            if self.settle(generation, &sent, result)? {
                report.updated += 1;
            }
        }
        Ok(())
    }

    /// Applies one flush result; returns whether the remote store accepted it.
    fn settle(
        &self,
        generation: u64,
        sent: &Task,
        result: Result<Task, RemoteError>,
    ) -> PassResult<bool> {
        match result {
            Ok(confirmed) => {
                let confirmed_id = confirmed.id.clone();
                let adoption =
                    self.commit(generation, |ledger| ledger.adopt_confirmed(sent, confirmed))?;
                info!(
                    "event=flush_task module=sync status=ok task_id={} server_id={} adoption={:?}",
                    sent.id, confirmed_id, adoption
                );
                if adoption == Adoption::Orphaned {
                    info!(
                        "event=flush_task module=sync status=orphaned server_id={confirmed_id} action=queue_delete"
                    );
                }
                Ok(true)
            }
            Err(RemoteError::Unauthorized) => Err(self.end_session(generation)),
            Err(err) => {
                warn!(
                    "event=flush_task module=sync status=retained task_id={} error_code={} error={}",
                    sent.id,
                    err.code(),
                    err
                );
                Ok(false)
            }
        }
    }

    async fn pull_and_merge(&self, generation: u64, report: &mut SyncReport) -> PassResult<()> {
        match self.ctx.gateway().list().await {
            Ok(remote) => {
                let merged = self.commit(generation, |ledger| ledger.merge_remote(&remote))?;
                info!(
                    "event=pull_merge module=sync status=ok remote={} merged={}",
                    remote.len(),
                    merged
                );
                report.merged = Some(merged);
            }
            Err(RemoteError::Unauthorized) => return Err(self.end_session(generation)),
            Err(err) => {
                warn!(
                    "event=pull_merge module=sync status=error error_code={} error={}",
                    err.code(),
                    err
                );
                report.pull_error = Some(err);
            }
        }
        Ok(())
    }

    async fn refresh_profile(&self, generation: u64) -> PassResult<()> {
        match self.ctx.gateway().fetch_profile().await {
            Ok(profile) => {
                self.commit(generation, |ledger| ledger.set_profile(profile))?;
                Ok(())
            }
            Err(RemoteError::Unauthorized) => Err(self.end_session(generation)),
            Err(err) => {
                warn!(
                    "event=profile_refresh module=sync status=error error_code={}",
                    err.code()
                );
                Ok(())
            }
        }
    }

    fn commit<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut Ledger) -> R,
    ) -> PassResult<R> {
        self.ctx.commit(generation, f).ok_or(SessionEnded)
    }

    fn end_session(&self, generation: u64) -> SessionEnded {
        warn!("event=sync_pass module=sync status=unauthorized action=logout");
        self.ctx.logout_from(generation);
        SessionEnded
    }
}
