//! Use-case services called by the presentation layer.
//!
//! # Responsibility
//! - Expose optimistic task mutations and read projections.
//! - Keep UI/CLI layers decoupled from storage and transport details.

pub mod task_service;
