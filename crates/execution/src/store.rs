//! Task record store - the single source of truth for task state.
//!
//! Every read and write takes one `RwLock` for its whole duration, so a
//! snapshot never observes a half-written record. Terminal transitions bump a
//! `watch` counter that waiters subscribe to.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use delegate_core::{TaskId, TaskOutcome, TaskRecord, TaskStatus, Time};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::error::StoreError;

/// A status change requested by the worker pool.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `pending -> running`, stamps `started_at`
    Start,
    /// `running -> succeeded|failed`, stamps `completed_at` and the outcome
    Complete(TaskOutcome),
}

impl Transition {
    fn target_status(&self) -> TaskStatus {
        match self {
            Transition::Start => TaskStatus::Running,
            Transition::Complete(outcome) => outcome.status(),
        }
    }
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Waiting for a worker
    pub pending: usize,
    /// Being executed
    pub running: usize,
    /// Finished with a value
    pub succeeded: usize,
    /// Finished with an error
    pub failed: usize,
}

impl StatusCounts {
    /// All records.
    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed
    }

    fn bump(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Default)]
struct Records {
    by_id: HashMap<TaskId, TaskRecord>,
    // Submission order
    order: Vec<TaskId>,
}

/// Thread-safe store of task records. Records are never evicted.
pub struct RecordStore {
    records: RwLock<Records>,
    settled: watch::Sender<u64>,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            records: RwLock::new(Records::default()),
            settled,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new record. It must be `pending`, and its id must be unused.
    pub fn create(&self, record: TaskRecord) -> Result<TaskId, StoreError> {
        if record.status != TaskStatus::Pending || record.outcome.is_some() {
            return Err(StoreError::NotPending {
                id: record.id,
                status: record.status,
            });
        }

        let mut records = self.write();
        if records.by_id.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }

        let id = record.id.clone();
        records.order.push(id.clone());
        records.by_id.insert(id.clone(), record);
        debug!(task_id = %id, "Record created");
        Ok(id)
    }

    /// Remove a record that never left `pending`. Used when a submission is
    /// rolled back after the record was created.
    pub(crate) fn discard_pending(&self, id: &TaskId) -> bool {
        let mut records = self.write();
        match records.by_id.get(id) {
            Some(record) if record.status == TaskStatus::Pending => {}
            _ => return false,
        }
        records.by_id.remove(id);
        records.order.retain(|entry| entry != id);
        debug!(task_id = %id, "Pending record discarded");
        true
    }

    /// Apply a transition. Anything outside `pending -> running ->
    /// {succeeded, failed}` is rejected and leaves the record untouched.
    pub fn transition(&self, id: &TaskId, transition: Transition) -> Result<TaskStatus, StoreError> {
        let next = transition.target_status();
        {
            let mut records = self.write();
            let record = records
                .by_id
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            record.status.validate_transition(id, &next)?;

            let now = chrono::Utc::now();
            match transition {
                Transition::Start => {
                    record.started_at = Some(not_before(now, record.submitted_at));
                }
                Transition::Complete(outcome) => {
                    let floor = record.started_at.unwrap_or(record.submitted_at);
                    record.completed_at = Some(not_before(now, floor));
                    record.outcome = Some(outcome);
                }
            }
            record.status = next;
        }

        if next.is_terminal() {
            self.settled.send_modify(|generation| *generation += 1);
        }
        Ok(next)
    }

    /// Copy of one record.
    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.read().by_id.get(id).cloned()
    }

    /// Status of one record, without cloning it.
    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.read().by_id.get(id).map(|record| record.status)
    }

    /// Point-in-time copy of every record, in submission order.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let records = self.read();
        records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records per status.
    pub fn counts(&self) -> StatusCounts {
        let records = self.read();
        let mut counts = StatusCounts::default();
        for record in records.by_id.values() {
            counts.bump(record.status);
        }
        counts
    }

    /// Receiver that changes whenever a record reaches a terminal status.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.settled.subscribe()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_before(now: Time, floor: Time) -> Time {
    now.max(floor)
}
