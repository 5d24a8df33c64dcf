//! Error types for the execution layer.

use delegate_core::{TaskId, TaskStatus, TransitionError};
use delegate_tools::RegistryError;

/// Errors from the task record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record with that id
    #[error("Task {0} not found")]
    NotFound(TaskId),

    /// A record with that id already exists
    #[error("Task id '{0}' is already in use")]
    DuplicateId(TaskId),

    /// A new record must start out `pending` with no outcome
    #[error("Task {id} must be created pending with no outcome (got '{status}')")]
    NotPending {
        /// Record id
        id: TaskId,
        /// Status the record carried
        status: TaskStatus,
    },

    /// The state machine refused the update
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

/// Errors reported synchronously by `submit_task`. No record exists for a
/// rejected submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Unknown target or malformed arguments
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Caller-supplied id is empty or contains whitespace
    #[error("Task id '{0}' is not valid")]
    InvalidId(TaskId),

    /// The store refused the record (duplicate id)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The manager no longer accepts work
    #[error("TaskManager is shut down")]
    ShutDown,
}
