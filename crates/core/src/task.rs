//! Task record model - one record per delegated unit of work.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::TraceContext;
use crate::id::TaskId;
use crate::Time;

/// Ordered parameter name -> value mapping passed to a capability.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// What kind of capability a task invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A plain callable tool
    Tool,
    /// A managed sub-agent
    ManagedAgent,
}

impl TaskKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Tool => "tool",
            TaskKind::ManagedAgent => "managed_agent",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tool" => Ok(TaskKind::Tool),
            "managed_agent" | "agent" => Ok(TaskKind::ManagedAgent),
            other => Err(format!(
                "unknown task type '{}', expected 'tool' or 'managed_agent'",
                other
            )),
        }
    }
}

/// Lifecycle status of a task.
///
/// Transitions are strictly `Pending -> Running -> {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting for a worker
    Pending,
    /// A worker is running the body
    Running,
    /// The body returned a value
    Succeeded,
    /// The body returned an error or panicked
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Succeeded,
        TaskStatus::Failed,
    ];

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    /// No further transition is possible from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    /// Validate a transition, naming the task in the error.
    pub fn validate_transition(
        &self,
        task_id: &TaskId,
        next: &TaskStatus,
    ) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                task_id: task_id.clone(),
                from: *self,
                to: *next,
            })
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            // "completed" is what agents tend to say
            "succeeded" | "completed" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!(
                "invalid status '{}', valid values: pending, running, succeeded, failed",
                other
            )),
        }
    }
}

/// An illegal status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task {task_id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    /// Task whose record was targeted
    pub task_id: TaskId,
    /// Current status
    pub from: TaskStatus,
    /// Requested status
    pub to: TaskStatus,
}

/// How a task body failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The capability returned an error
    Error,
    /// The capability panicked
    Panic,
}

/// Structured error payload stored on a failed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Error message (never empty)
    pub message: String,
    /// Failure kind
    pub kind: FailureKind,
    /// Diagnostic detail, e.g. the full error chain
    pub detail: Option<String>,
}

impl TaskFailure {
    /// Failure from an error returned by the capability.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let chain: Vec<String> = err.chain().map(|e| e.to_string()).collect();
        Self {
            message: non_empty(err.to_string(), "capability returned an error"),
            kind: FailureKind::Error,
            detail: (chain.len() > 1).then(|| chain.join(": ")),
        }
    }

    /// Failure from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::new()
        };
        Self {
            message: non_empty(message, "capability panicked"),
            kind: FailureKind::Panic,
            detail: None,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Error => f.write_str(&self.message),
            FailureKind::Panic => write!(f, "panic: {}", self.message),
        }
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// Terminal result of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Value returned by the capability
    Succeeded {
        /// Returned value
        value: serde_json::Value,
    },
    /// Error payload
    Failed {
        /// Failure details
        error: TaskFailure,
    },
}

impl TaskOutcome {
    /// The terminal status this outcome maps to.
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Succeeded { .. } => TaskStatus::Succeeded,
            TaskOutcome::Failed { .. } => TaskStatus::Failed,
        }
    }

    /// Returned value, if the task succeeded.
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            TaskOutcome::Succeeded { value } => Some(value),
            TaskOutcome::Failed { .. } => None,
        }
    }

    /// Error payload, if the task failed.
    pub fn error(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Succeeded { .. } => None,
            TaskOutcome::Failed { error } => Some(error),
        }
    }
}

/// One delegated unit of work and its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier
    pub id: TaskId,

    /// Tool or managed agent
    pub kind: TaskKind,

    /// Capability name in the registry
    pub target: String,

    /// Arguments passed to the capability
    pub arguments: Arguments,

    /// Current status
    pub status: TaskStatus,

    /// When submitted
    pub submitted_at: Time,

    /// When a worker picked it up
    pub started_at: Option<Time>,

    /// When it reached a terminal status
    pub completed_at: Option<Time>,

    /// Present iff the status is terminal
    pub outcome: Option<TaskOutcome>,

    /// Tracing context of the submitter
    #[serde(skip)]
    pub captured_context: TraceContext,

    /// Thread that submitted the task
    pub owner_thread: String,
}

impl TaskRecord {
    /// Create a pending record.
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        target: impl Into<String>,
        arguments: Arguments,
        captured_context: TraceContext,
    ) -> Self {
        Self {
            id,
            kind,
            target: target.into(),
            arguments,
            status: TaskStatus::Pending,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            outcome: None,
            captured_context,
            owner_thread: current_thread_label(),
        }
    }

    /// Whether the record reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time from start to completion.
    pub fn run_time(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    /// Time from submission to completion.
    pub fn turnaround(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.submitted_at)
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks in this status
    pub status: Option<TaskStatus>,

    /// Maximum results to return
    pub limit: Option<usize>,

    /// Newest submissions first
    pub newest_first: bool,
}

impl TaskFilter {
    /// Whether a record passes the status filter.
    pub fn matches(&self, record: &TaskRecord) -> bool {
        self.status.map_or(true, |status| record.status == status)
    }
}

fn current_thread_label() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}
