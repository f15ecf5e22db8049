//! Remote task gateway contract and HTTP implementation.
//!
//! # Responsibility
//! - Define the async list/create/update/delete contract used by sync.
//! - Classify failures into `Transient`, `Unauthorized` and `Rejected`.
//!
//! # Invariants
//! - Every request carries the current bearer token.
//! - Only `Transient` failures may fall back to offline queuing.

mod error;
mod gateway;
mod http;

pub use error::{RemoteError, RemoteResult};
pub use gateway::{NewTask, RemoteTask, TaskGateway, TaskPatch};
pub use http::HttpTaskGateway;
