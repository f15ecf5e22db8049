//! Shared state behind the mutation API and the orchestrator.
//!
//! # Responsibility
//! - Own the in-memory task list, pending-delete queue and cache store.
//! - Persist and publish after every committed change.
//! - Discard writes prepared before a logout (generation check).
//!
//! # Invariants
//! - The ledger lock is never held across an await point.
//! - Every read-modify-write of tasks + cache happens in one lock scope.
//! - Memory and cache are written together; cache failures are logged, and
//!   memory stays authoritative for the session.

use crate::auth::Credentials;
use crate::merge::merge;
use crate::model::profile::UserProfile;
use crate::model::task::{PendingDelete, ServerId, Task, TaskId};
use crate::remote::TaskGateway;
use crate::store::LocalCacheStore;
use crate::sync::gate::RunGate;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// What happened when a server-confirmed record was folded back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Adoption {
    /// Local entry replaced wholesale by the server record.
    Replaced,
    /// Local entry changed while the call was in flight; server id adopted,
    /// local fields kept and still pending.
    Superseded,
    /// Local entry was deleted while the call was in flight.
    Orphaned,
}

/// In-memory projection plus its persistence handle.
pub(crate) struct Ledger {
    store: LocalCacheStore,
    pub(crate) tasks: Vec<Task>,
    pub(crate) pending_deletes: Vec<PendingDelete>,
    pub(crate) profile: Option<UserProfile>,
    pub(crate) editing: Option<TaskId>,
    /// Tasks with a mutation-API remote call outstanding; queue flush skips them.
    pub(crate) in_flight: HashSet<TaskId>,
}

impl Ledger {
    pub(crate) fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    pub(crate) fn find_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| &task.id == id)
    }

    pub(crate) fn remove(&mut self, id: &TaskId) -> Option<(usize, Task)> {
        let index = self.position(id)?;
        Some((index, self.tasks.remove(index)))
    }

    /// Puts a removed task back where it was, unless it reappeared meanwhile.
    pub(crate) fn restore(&mut self, index: usize, task: Task) {
        if self.position(&task.id).is_some() {
            return;
        }
        let index = index.min(self.tasks.len());
        self.tasks.insert(index, task);
    }

    pub(crate) fn queue_delete(&mut self, id: ServerId) {
        if !self.pending_deletes.iter().any(|record| record.id == id) {
            self.pending_deletes.push(PendingDelete::new(id));
        }
    }

    pub(crate) fn drop_delete(&mut self, id: ServerId) {
        self.pending_deletes.retain(|record| record.id != id);
    }

    /// Counts a transient failure; drops the record once it is exhausted.
    ///
    /// Returns `true` when the record was dropped.
    pub(crate) fn record_delete_failure(&mut self, id: ServerId) -> bool {
        let Some(record) = self.pending_deletes.iter_mut().find(|record| record.id == id) else {
            return false;
        };
        record.attempts += 1;
        if record.is_exhausted() {
            self.drop_delete(id);
            return true;
        }
        false
    }

    /// Merges a server listing into the view, returning the new length.
    ///
    /// Ids this device is deleting stay out of the view: queued deletes, and
    /// online deletes whose call is still outstanding.
    pub(crate) fn merge_remote(&mut self, remote: &[Task]) -> usize {
        let visible: Vec<Task> = remote
            .iter()
            .filter(|task| !self.is_being_deleted(&task.id))
            .cloned()
            .collect();
        self.tasks = merge(&self.tasks, &visible);
        self.tasks.len()
    }

    fn is_being_deleted(&self, id: &TaskId) -> bool {
        let Some(server_id) = id.server_id() else {
            return false;
        };
        self.pending_deletes.iter().any(|record| record.id == server_id)
            || (self.in_flight.contains(id) && self.position(id).is_none())
    }

    /// Folds a server-confirmed record into the list.
    ///
    /// `sent` is the local state the remote call was made with.
    pub(crate) fn adopt_confirmed(&mut self, sent: &Task, confirmed: Task) -> Adoption {
        let Some(index) = self.position(&sent.id) else {
            if sent.is_temporary() {
                if let Some(id) = confirmed.id.server_id() {
                    self.queue_delete(id);
                }
            }
            return Adoption::Orphaned;
        };

        let confirmed_id = confirmed.id.clone();
        let adoption = if self.tasks[index].same_fields(sent) {
            self.tasks[index] = confirmed;
            Adoption::Replaced
        } else {
            let current = &mut self.tasks[index];
            current.id = confirmed_id.clone();
            current.pending_sync = true;
            Adoption::Superseded
        };

        let mut slot = 0;
        self.tasks.retain(|task| {
            let keep = slot == index || task.id != confirmed_id;
            slot += 1;
            keep
        });
        adoption
    }

    fn persist(&self) {
        if let Err(err) = self.store.save_tasks(&self.tasks) {
            error!(
                "event=cache_write module=sync status=error key=tasks count={} error={}",
                self.tasks.len(),
                err
            );
        }
        if let Err(err) = self.store.save_pending_deletes(&self.pending_deletes) {
            error!(
                "event=cache_write module=sync status=error key=pending_deletes count={} error={}",
                self.pending_deletes.len(),
                err
            );
        }
    }

    pub(crate) fn set_profile(&mut self, profile: UserProfile) {
        if let Err(err) = self.store.save_profile(&profile) {
            error!("event=cache_write module=sync status=error key=user_profile error={err}");
        }
        self.profile = Some(profile);
    }
}

/// State shared by `TaskService` and `SyncOrchestrator`.
pub struct SyncContext {
    ledger: Mutex<Ledger>,
    gateway: Arc<dyn TaskGateway>,
    credentials: Arc<dyn Credentials>,
    online: AtomicBool,
    mounted: AtomicBool,
    generation: AtomicU64,
    gate: RunGate,
    snapshot: watch::Sender<Vec<Task>>,
}

impl SyncContext {
    /// Loads the cache and publishes it before any network activity.
    pub fn new(
        store: LocalCacheStore,
        gateway: Arc<dyn TaskGateway>,
        credentials: Arc<dyn Credentials>,
        online: bool,
    ) -> Arc<Self> {
        let tasks = store.load_tasks();
        let pending_deletes = store.load_pending_deletes();
        let profile = store.load_profile();
        info!(
            "event=cache_load module=sync status=ok tasks={} pending_deletes={} profile={}",
            tasks.len(),
            pending_deletes.len(),
            profile.is_some()
        );

        let (snapshot, _) = watch::channel(tasks.clone());
        Arc::new(Self {
            ledger: Mutex::new(Ledger {
                store,
                tasks,
                pending_deletes,
                profile,
                editing: None,
                in_flight: HashSet::new(),
            }),
            gateway,
            credentials,
            online: AtomicBool::new(online),
            mounted: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            gate: RunGate::default(),
            snapshot,
        })
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.ledger.lock().tasks.clone()
    }

    pub fn pending_deletes(&self) -> Vec<PendingDelete> {
        self.ledger.lock().pending_deletes.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.ledger.lock().profile.clone()
    }

    /// Receives a fresh snapshot after every committed change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.snapshot.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn has_token(&self) -> bool {
        self.credentials.has_token()
    }

    /// Records the connectivity signal; returns the previous value.
    pub(crate) fn swap_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }

    /// Marks the view as mounted; returns `false` if it already was.
    pub(crate) fn mount(&self) -> bool {
        !self.mounted.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn gateway(&self) -> &dyn TaskGateway {
        self.gateway.as_ref()
    }

    pub(crate) fn gate(&self) -> &RunGate {
        &self.gate
    }

    /// Whether a reconciliation pass is executing right now.
    pub fn is_syncing(&self) -> bool {
        self.gate.is_running()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Runs `f` under the lock without persisting.
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        f(&mut self.ledger.lock())
    }

    /// Runs `f`, persists and publishes, unless a logout happened since `generation`.
    pub(crate) fn commit<R>(&self, generation: u64, f: impl FnOnce(&mut Ledger) -> R) -> Option<R> {
        let mut ledger = self.ledger.lock();
        if self.generation() != generation {
            warn!(
                "event=stale_write module=sync status=skipped generation={} current={}",
                generation,
                self.generation()
            );
            return None;
        }
        let result = f(&mut ledger);
        ledger.persist();
        self.snapshot.send_replace(ledger.tasks.clone());
        Some(result)
    }

    /// Clears all persisted and in-memory state and drops the token.
    pub fn logout(&self) {
        let mut ledger = self.ledger.lock();
        self.wipe(&mut ledger);
    }

    /// Logs out only if no logout happened since `generation`.
    ///
    /// A credential rejection observed by a call from an earlier session must
    /// not end the session that replaced it. Returns whether it logged out.
    pub(crate) fn logout_from(&self, generation: u64) -> bool {
        let mut ledger = self.ledger.lock();
        if self.generation() != generation {
            info!(
                "event=logout module=sync status=skipped reason=stale_session generation={} current={}",
                generation,
                self.generation()
            );
            return false;
        }
        self.wipe(&mut ledger);
        true
    }

    fn wipe(&self, ledger: &mut Ledger) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(err) = ledger.store.clear_all() {
            error!("event=logout module=sync status=error error={err}");
        }
        ledger.tasks.clear();
        ledger.pending_deletes.clear();
        ledger.profile = None;
        ledger.editing = None;
        ledger.in_flight.clear();
        self.credentials.clear();
        self.mounted.store(false, Ordering::SeqCst);
        self.snapshot.send_replace(Vec::new());
        info!("event=logout module=sync status=ok generation={generation}");
    }
}
