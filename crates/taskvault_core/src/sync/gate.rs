//! Single-flight gate for reconciliation passes.
//!
//! State machine: `Idle -> Running -> Idle`. A trigger arriving while a pass
//! runs is recorded and handed to the running leader when it finishes, so at
//! most one pass executes at a time and no trigger is lost.

use parking_lot::Mutex;

/// Why a reconciliation pass was requested.
///
/// Ordered by scope: a reconnect pass does everything an initial-load pass
/// does, so it supersedes a queued initial load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncTrigger {
    InitialLoad,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Running { queued: Option<SyncTrigger> },
}

#[derive(Debug)]
pub(crate) struct RunGate {
    state: Mutex<GateState>,
}

impl Default for RunGate {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
        }
    }
}

impl RunGate {
    /// Enters the gate, or records `trigger` for the current leader.
    pub(crate) fn try_enter(&self, trigger: SyncTrigger) -> Option<GateLease<'_>> {
        let mut state = self.state.lock();
        match *state {
            GateState::Idle => {
                *state = GateState::Running { queued: None };
                Some(GateLease {
                    gate: self,
                    active: true,
                })
            }
            GateState::Running { queued } => {
                let merged = queued.map_or(trigger, |existing| existing.max(trigger));
                *state = GateState::Running {
                    queued: Some(merged),
                };
                None
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.state.lock(), GateState::Running { .. })
    }
}

/// Held by the leader while passes run. Dropping it returns the gate to idle.
pub(crate) struct GateLease<'a> {
    gate: &'a RunGate,
    active: bool,
}

impl GateLease<'_> {
    /// Takes the next queued trigger, or releases the gate when none is left.
    pub(crate) fn next(&mut self) -> Option<SyncTrigger> {
        let mut state = self.gate.state.lock();
        match *state {
            GateState::Running {
                queued: Some(trigger),
            } => {
                *state = GateState::Running { queued: None };
                Some(trigger)
            }
            _ => {
                *state = GateState::Idle;
                self.active = false;
                None
            }
        }
    }
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        if self.active {
            *self.gate.state.lock() = GateState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RunGate, SyncTrigger};

    #[test]
    fn second_trigger_is_queued_and_handed_to_leader() {
        let gate = RunGate::default();
        let mut lease = gate.try_enter(SyncTrigger::InitialLoad).unwrap();
        assert!(gate.try_enter(SyncTrigger::InitialLoad).is_none());
        assert!(gate.try_enter(SyncTrigger::Reconnect).is_none());
        assert!(gate.try_enter(SyncTrigger::InitialLoad).is_none());

        assert_eq!(lease.next(), Some(SyncTrigger::Reconnect));
        assert_eq!(lease.next(), None);
        assert!(!gate.is_running());
        drop(lease);
        assert!(gate.try_enter(SyncTrigger::Reconnect).is_some());
    }

    #[test]
    fn dropping_lease_mid_run_releases_gate() {
        let gate = RunGate::default();
        let lease = gate.try_enter(SyncTrigger::Reconnect).unwrap();
        assert!(gate.is_running());
        drop(lease);
        assert!(!gate.is_running());
    }
}
