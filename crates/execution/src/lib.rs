//! Execution layer - record store, worker pool, dispatcher and waiter behind
//! the [`TaskManager`] control surface.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod store;
pub mod trace;
pub mod pool;
mod dispatcher;
pub mod waiter;
pub mod manager;

pub use config::{ManagerConfig, DEFAULT_MAX_SLEEP, DEFAULT_MAX_WORKERS, DEFAULT_WAIT};
pub use error::{StoreError, SubmitError};
pub use store::{RecordStore, StatusCounts, Transition};
pub use trace::{NoopBridge, SpanBridge, TraceBridge};
pub use pool::WorkerPool;
pub use waiter::{WaitOutcome, WaitStatus, WaitSummary};
pub use manager::{ResultState, TaskManager, TaskStatistics};
