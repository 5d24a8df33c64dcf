//! delegate core data models.
//!
//! This crate defines the task record tracked for every unit of work a
//! control loop delegates, and the status state machine it moves through.

#![warn(missing_docs)]

// Core identities
mod id;

// Tracing handle
mod context;

// Task records
mod task;

// Re-exports
pub use id::{TaskId, TASK_ID_PREFIX};
pub use context::TraceContext;
pub use task::{
    Arguments, FailureKind, TaskFailure, TaskFilter, TaskKind, TaskOutcome, TaskRecord,
    TaskStatus, TransitionError,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
