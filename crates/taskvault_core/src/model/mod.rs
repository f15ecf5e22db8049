//! Domain model for the offline task list.
//!
//! # Responsibility
//! - Define canonical task, pending-delete and profile records.
//! - Keep temporary (client) and server identity in one typed `TaskId`.
//!
//! # Invariants
//! - A task with a temporary id has never been acknowledged by the server.
//! - Acknowledged tasks are replaced wholesale by the server record.

pub mod profile;
pub mod task;
