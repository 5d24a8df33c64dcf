//! Dispatcher - validates a submission, records it and enqueues the body.

use std::sync::{Arc, Mutex, PoisonError};

use delegate_core::{Arguments, TaskId, TaskKind, TaskRecord};
use delegate_tools::CapabilityRegistry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SubmitError;
use crate::pool::Job;
use crate::store::RecordStore;
use crate::trace::TraceBridge;

pub(crate) struct Dispatcher {
    registry: CapabilityRegistry,
    store: Arc<RecordStore>,
    bridge: Arc<dyn TraceBridge>,
    // `None` once the manager shut down
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: CapabilityRegistry,
        store: Arc<RecordStore>,
        bridge: Arc<dyn TraceBridge>,
        queue: mpsc::UnboundedSender<Job>,
    ) -> Self {
        Self {
            registry,
            store,
            bridge,
            queue: Mutex::new(Some(queue)),
        }
    }

    pub(crate) fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Submit without blocking on execution. A rejected submission leaves no
    /// record behind.
    pub(crate) fn submit(
        &self,
        id: Option<TaskId>,
        kind: TaskKind,
        target: &str,
        arguments: Arguments,
    ) -> Result<TaskId, SubmitError> {
        // Held until the job is queued, so shutdown cannot slip in between.
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = match queue.as_ref() {
            Some(sender) if !sender.is_closed() => sender,
            _ => return Err(SubmitError::ShutDown),
        };

        let id = match id {
            Some(id) if !id.is_valid() => return Err(SubmitError::InvalidId(id)),
            Some(id) => id,
            None => TaskId::new(),
        };

        let capability = self.registry.resolve(kind, target, &arguments)?;

        let context = self.bridge.capture();
        let record = TaskRecord::new(id, kind, target, arguments.clone(), context.clone());
        let id = self.store.create(record)?;

        let job = Job {
            id: id.clone(),
            capability,
            arguments,
            context,
        };
        if sender.send(job).is_err() {
            // Receiver gone while the sender is still held: the workers are
            // gone. Roll the record back so nothing is left pending.
            self.store.discard_pending(&id);
            warn!(task_id = %id, "Worker queue closed; submission rolled back");
            return Err(SubmitError::ShutDown);
        }

        info!(task_id = %id, kind = %kind, target_name = target, "Task submitted");
        Ok(id)
    }

    /// Stop accepting submissions. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        let closed = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            debug!("Submission queue closed");
        }
        closed
    }

    pub(crate) fn is_open(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
