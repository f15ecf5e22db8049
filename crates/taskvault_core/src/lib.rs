//! Offline-first sync core for the TaskVault task list.
//! This crate owns the cache, the merge rule and the reconciliation protocol.

pub mod auth;
pub mod config;
pub mod logging;
pub mod merge;
pub mod model;
pub mod remote;
pub mod service;
pub mod store;
pub mod sync;

pub use auth::{Credentials, StaticCredentials};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use merge::merge;
pub use model::profile::UserProfile;
pub use model::task::{
    PendingDelete, ServerId, Task, TaskFilter, TaskId, TaskValidationError, MAX_DELETE_ATTEMPTS,
};
pub use remote::{HttpTaskGateway, NewTask, RemoteError, RemoteResult, TaskGateway, TaskPatch};
pub use service::task_service::{MutationOutcome, TaskService};
pub use store::{open_cache, open_cache_in_memory, LocalCacheStore, StoreError, StoreResult};
pub use sync::{SkipReason, SyncContext, SyncOrchestrator, SyncOutcome, SyncReport, SyncTrigger};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
