//! Fixed-size worker pool.
//!
//! `max_workers` long-lived tokio tasks share one FIFO queue. Each body runs
//! on the blocking thread pool, so a body that blocks its thread stalls
//! neither the runtime nor the other workers. A body that fails or panics is
//! recorded as a failed task; its worker keeps going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use delegate_core::{Arguments, FailureKind, TaskFailure, TaskId, TaskOutcome, TaskStatus, TraceContext};
use delegate_tools::Capability;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::StoreError;
use crate::store::{RecordStore, Transition};
use crate::trace::{RestoredContext, TraceBridge};

/// One queued task body.
pub(crate) struct Job {
    pub id: TaskId,
    pub capability: Capability,
    pub arguments: Arguments,
    pub context: TraceContext,
}

/// Handle to the running workers.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime.
    pub(crate) fn spawn(
        size: usize,
        queue: mpsc::UnboundedReceiver<Job>,
        store: Arc<RecordStore>,
        bridge: Arc<dyn TraceBridge>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue));
        let workers = (0..size.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&queue),
                    Arc::clone(&store),
                    Arc::clone(&bridge),
                ))
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), "Worker pool started");
        Self { workers }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to drain the (closed) queue and exit.
    pub async fn join(self) {
        for (worker, handle) in self.workers.into_iter().enumerate() {
            if let Err(err) = handle.await {
                error!(worker, "Worker exited abnormally: {}", err);
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    store: Arc<RecordStore>,
    bridge: Arc<dyn TraceBridge>,
) {
    debug!(worker, "Worker started");
    loop {
        // The lock is only held while waiting for the next job.
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        let id = job.id.clone();
        // Covers the trace bridge and the store updates around the body.
        let ran = AssertUnwindSafe(run_job(worker, job, &store, bridge.as_ref()))
            .catch_unwind()
            .await;
        if let Err(payload) = ran {
            settle_after_panic(worker, &id, &store, TaskFailure::from_panic(payload.as_ref()));
        }
    }
    debug!(worker, "Worker stopped");
}

async fn run_job(worker: usize, job: Job, store: &RecordStore, bridge: &dyn TraceBridge) {
    let Job {
        id,
        capability,
        arguments,
        context,
    } = job;

    let restored = RestoredContext::restore(bridge, &context, &id, capability.kind(), capability.name());
    let span = restored.span();

    if let Err(err) = store.transition(&id, Transition::Start) {
        internal_defect(&id, &err);
        return;
    }
    span.in_scope(|| debug!(worker, task_id = %id, "Executing task"));

    // Built here so it carries this thread's subscriber onto the blocking one.
    let body = async move { capability.invoke(&arguments).await }
        .instrument(span.clone())
        .with_current_subscriber();
    let handle = Handle::current();
    let body = tokio::task::spawn_blocking(move || handle.block_on(body));

    let outcome = match body.await {
        Ok(Ok(value)) => {
            span.in_scope(|| info!(task_id = %id, "Task succeeded"));
            TaskOutcome::Succeeded { value }
        }
        Ok(Err(err)) => {
            let error = TaskFailure::from_error(&err);
            span.in_scope(|| warn!(task_id = %id, error = %error, "Task failed"));
            TaskOutcome::Failed { error }
        }
        Err(join) => {
            let error = join_failure(join);
            span.in_scope(|| warn!(task_id = %id, error = %error, "Task panicked"));
            TaskOutcome::Failed { error }
        }
    };

    if let Err(err) = store.transition(&id, Transition::Complete(outcome)) {
        internal_defect(&id, &err);
    }
    drop(restored);
}

fn join_failure(join: JoinError) -> TaskFailure {
    match join.try_into_panic() {
        Ok(payload) => TaskFailure::from_panic(payload.as_ref()),
        // Only happens while the runtime shuts down.
        Err(join) => TaskFailure {
            message: format!("task body did not run to completion: {}", join),
            kind: FailureKind::Error,
            detail: None,
        },
    }
}

/// Fail a record whose job panicked outside the body, e.g. in a trace
/// bridge. A record that already settled is left alone.
fn settle_after_panic(worker: usize, id: &TaskId, store: &RecordStore, error: TaskFailure) {
    error!(worker, task_id = %id, error = %error, "Worker recovered from a panic outside the task body");
    if store.status(id) == Some(TaskStatus::Pending) {
        if let Err(err) = store.transition(id, Transition::Start) {
            internal_defect(id, &err);
            return;
        }
    }
    if store.status(id) == Some(TaskStatus::Running) {
        if let Err(err) = store.transition(id, Transition::Complete(TaskOutcome::Failed { error })) {
            internal_defect(id, &err);
        }
    }
}

/// A worker update the store refused. This is a pool bug, not a task
/// failure, so it is logged and never written onto the record.
fn internal_defect(id: &TaskId, err: &StoreError) {
    error!(task_id = %id, error = %err, "Internal error: record store rejected a worker update");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::testing::CountingBridge;
    use crate::trace::NoopBridge;
    use async_trait::async_trait;
    use delegate_core::{TaskKind, TaskRecord};
    use delegate_tools::Tool;
    use delegate_tools::ToolSchema;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Flaky;

    #[async_trait]
    impl Tool for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Fails, panics or succeeds depending on `mode`"
        }

        async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
            match arguments.get("mode").and_then(Value::as_str) {
                Some("error") => anyhow::bail!("upstream returned 503"),
                Some("panic") => panic!("index out of bounds"),
                _ => Ok(json!("fine")),
            }
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema::new("flaky", "test tool")
        }
    }

    fn enqueue(
        store: &RecordStore,
        tx: &mpsc::UnboundedSender<Job>,
        id: &str,
        mode: &str,
    ) -> TaskId {
        let mut arguments = Arguments::new();
        arguments.insert("mode".into(), json!(mode));
        let id = store
            .create(TaskRecord::new(
                TaskId::from(id),
                TaskKind::Tool,
                "flaky",
                arguments.clone(),
                TraceContext::detached(),
            ))
            .unwrap();
        tx.send(Job {
            id: id.clone(),
            capability: Capability::Tool(Arc::new(Flaky)),
            arguments,
            context: TraceContext::detached(),
        })
        .ok()
        .unwrap();
        id
    }

    #[tokio::test]
    async fn test_single_worker_survives_error_and_panic() {
        let store = Arc::new(RecordStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(1, rx, Arc::clone(&store), Arc::new(NoopBridge));

        let err = enqueue(&store, &tx, "err", "error");
        let boom = enqueue(&store, &tx, "boom", "panic");
        let ok = enqueue(&store, &tx, "ok", "ok");

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), pool.join()).await.unwrap();

        let failed = store.get(&err).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(
            failed.outcome.unwrap().error().unwrap().message,
            "upstream returned 503"
        );

        let panicked = store.get(&boom).unwrap().outcome.unwrap();
        let error = panicked.error().unwrap();
        assert_eq!(error.kind, FailureKind::Panic);
        assert_eq!(error.message, "index out of bounds");

        assert_eq!(store.status(&ok), Some(TaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_context_released_once_per_task_even_on_failure() {
        let store = Arc::new(RecordStore::new());
        let bridge = Arc::new(CountingBridge::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(2, rx, Arc::clone(&store), bridge.clone());

        enqueue(&store, &tx, "a", "error");
        enqueue(&store, &tx, "b", "panic");
        enqueue(&store, &tx, "c", "ok");
        drop(tx);
        pool.join().await;

        // capture happens in the dispatcher, not here
        assert_eq!(bridge.counts(), (0, 3, 3));
    }

    struct Stubborn;

    #[async_trait]
    impl Tool for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }

        fn description(&self) -> &str {
            "Blocks its thread"
        }

        async fn invoke(&self, _arguments: &Arguments) -> Result<Value, anyhow::Error> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(json!("done"))
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema::new("stubborn", "test tool")
        }
    }

    // Current-thread runtime: a body blocking inline would serialize
    // everything, timers included.
    #[tokio::test]
    async fn test_blocking_bodies_keep_runtime_and_workers_free() {
        let store = Arc::new(RecordStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(2, rx, Arc::clone(&store), Arc::new(NoopBridge));

        let started = tokio::time::Instant::now();
        let ids: Vec<TaskId> = ["s1", "s2"]
            .into_iter()
            .map(|name| {
                let id = store
                    .create(TaskRecord::new(
                        TaskId::from(name),
                        TaskKind::Tool,
                        "stubborn",
                        Arguments::new(),
                        TraceContext::detached(),
                    ))
                    .unwrap();
                tx.send(Job {
                    id: id.clone(),
                    capability: Capability::Tool(Arc::new(Stubborn)),
                    arguments: Arguments::new(),
                    context: TraceContext::detached(),
                })
                .ok()
                .unwrap();
                id
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_millis(300), "timer starved: {:?}", started.elapsed());

        drop(tx);
        pool.join().await;
        assert!(started.elapsed() < Duration::from_millis(900), "not parallel: {:?}", started.elapsed());
        for id in &ids {
            assert_eq!(store.status(id), Some(TaskStatus::Succeeded));
        }
    }

    /// Panics while restoring the context of task `cursed`.
    struct FragileBridge;

    impl TraceBridge for FragileBridge {
        fn capture(&self) -> TraceContext {
            TraceContext::detached()
        }

        fn restore(&self, _context: &TraceContext, id: &TaskId, _kind: TaskKind, _target: &str) -> tracing::Span {
            if id.as_str() == "cursed" {
                panic!("bridge exploded");
            }
            tracing::Span::none()
        }
    }

    #[tokio::test]
    async fn test_bridge_panic_fails_the_task_not_the_worker() {
        let store = Arc::new(RecordStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(1, rx, Arc::clone(&store), Arc::new(FragileBridge));

        let cursed = enqueue(&store, &tx, "cursed", "ok");
        let after = enqueue(&store, &tx, "after", "ok");
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), pool.join()).await.unwrap();

        let record = store.get(&cursed).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.outcome.unwrap().error().cloned().unwrap();
        assert_eq!(error.kind, FailureKind::Panic);
        assert_eq!(error.message, "bridge exploded");

        assert_eq!(store.status(&after), Some(TaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_pool_size_at_least_one() {
        let (_tx, rx) = mpsc::unbounded_channel::<Job>();
        let pool = WorkerPool::spawn(0, rx, Arc::new(RecordStore::new()), Arc::new(NoopBridge));
        assert_eq!(pool.size(), 1);
    }
}
