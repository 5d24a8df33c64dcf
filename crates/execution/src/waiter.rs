//! Waiting on a set of tasks with a deadline.

use std::time::Duration;

use delegate_core::{TaskId, TaskStatus};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::store::RecordStore;

/// Status of one id in a [`WaitSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    /// Not picked up yet
    Pending,
    /// Still executing
    Running,
    /// Finished with a value
    Succeeded,
    /// Finished with an error
    Failed,
    /// No such task
    NotFound,
}

impl WaitStatus {
    fn probe(store: &RecordStore, id: &TaskId) -> Self {
        match store.status(id) {
            Some(status) => status.into(),
            None => WaitStatus::NotFound,
        }
    }

    /// Nothing more will happen to this id.
    pub fn is_settled(&self) -> bool {
        !matches!(self, WaitStatus::Pending | WaitStatus::Running)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitStatus::Pending => "pending",
            WaitStatus::Running => "running",
            WaitStatus::Succeeded => "succeeded",
            WaitStatus::Failed => "failed",
            WaitStatus::NotFound => "not_found",
        }
    }
}

impl From<TaskStatus> for WaitStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => WaitStatus::Pending,
            TaskStatus::Running => WaitStatus::Running,
            TaskStatus::Succeeded => WaitStatus::Succeeded,
            TaskStatus::Failed => WaitStatus::Failed,
        }
    }
}

impl std::fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    /// Every id settled before the deadline
    Completed,
    /// The deadline passed first
    TimedOut,
}

/// Per-id result of a wait.
#[derive(Debug, Clone, Serialize)]
pub struct WaitSummary {
    /// How the wait ended
    pub outcome: WaitOutcome,
    /// Time spent waiting
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Status of each requested id, in request order
    pub entries: Vec<(TaskId, WaitStatus)>,
}

impl WaitSummary {
    /// Whether the deadline passed with work outstanding.
    pub fn timed_out(&self) -> bool {
        self.outcome == WaitOutcome::TimedOut
    }

    /// Status of one id.
    pub fn status_of(&self, id: &TaskId) -> Option<WaitStatus> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == id)
            .map(|(_, status)| *status)
    }

    fn with_status(&self, pred: impl Fn(&WaitStatus) -> bool) -> Vec<&TaskId> {
        self.entries
            .iter()
            .filter(|(_, status)| pred(status))
            .map(|(id, _)| id)
            .collect()
    }

    /// Ids that succeeded.
    pub fn succeeded(&self) -> Vec<&TaskId> {
        self.with_status(|s| *s == WaitStatus::Succeeded)
    }

    /// Ids that failed.
    pub fn failed(&self) -> Vec<&TaskId> {
        self.with_status(|s| *s == WaitStatus::Failed)
    }

    /// Ids still pending or running.
    pub fn unfinished(&self) -> Vec<&TaskId> {
        self.with_status(|s| !s.is_settled())
    }

    /// Ids the store does not know.
    pub fn not_found(&self) -> Vec<&TaskId> {
        self.with_status(|s| *s == WaitStatus::NotFound)
    }
}

// Far enough to never fire; avoids `Instant` overflow on huge waits.
const FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Wait until every id settles or `max_wait` passes. Never fails: a timeout
/// is reported in the summary.
pub(crate) async fn wait_for(store: &RecordStore, ids: &[TaskId], max_wait: Duration) -> WaitSummary {
    let start = Instant::now();
    let deadline = start + max_wait.min(FOREVER);
    let mut settled = store.subscribe();

    debug!(tasks = ids.len(), max_wait_ms = max_wait.as_millis() as u64, "Waiting for tasks");

    loop {
        // Mark the current generation seen before probing, so a completion
        // racing with the probe still wakes us.
        settled.borrow_and_update();
        let entries = probe_all(store, ids);

        if entries.iter().all(|(_, status)| status.is_settled()) {
            return summary(WaitOutcome::Completed, start, entries);
        }

        match tokio::time::timeout_at(deadline, settled.changed()).await {
            Ok(Ok(())) => continue,
            // Store dropped; nothing can change any more.
            Ok(Err(_)) => return summary(WaitOutcome::TimedOut, start, entries),
            Err(_) => {
                let entries = probe_all(store, ids);
                let outcome = if entries.iter().all(|(_, status)| status.is_settled()) {
                    WaitOutcome::Completed
                } else {
                    WaitOutcome::TimedOut
                };
                return summary(outcome, start, entries);
            }
        }
    }
}

fn probe_all(store: &RecordStore, ids: &[TaskId]) -> Vec<(TaskId, WaitStatus)> {
    ids.iter()
        .map(|id| (id.clone(), WaitStatus::probe(store, id)))
        .collect()
}

fn summary(outcome: WaitOutcome, start: Instant, entries: Vec<(TaskId, WaitStatus)>) -> WaitSummary {
    let summary = WaitSummary {
        outcome,
        elapsed: start.elapsed(),
        entries,
    };
    debug!(
        outcome = ?summary.outcome,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Wait finished"
    );
    summary
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
