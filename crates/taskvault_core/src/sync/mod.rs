//! Offline reconciliation: shared state, run gate and orchestrator.
//!
//! # See also
//! - `service::task_service` for the optimistic mutation side.

pub mod context;
mod gate;
pub mod orchestrator;

pub use context::SyncContext;
pub use gate::SyncTrigger;
pub use orchestrator::{SkipReason, SyncOrchestrator, SyncOutcome, SyncReport};
