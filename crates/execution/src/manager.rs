//! The task manager - control surface over the store, dispatcher and pool.
//!
//! ```text
//! submit_task -> Dispatcher -> RecordStore -> WorkerPool
//! wait_for_tasks / get_task_results / check_task / list_tasks <- RecordStore
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use delegate_core::{Arguments, TaskFilter, TaskId, TaskKind, TaskOutcome, TaskRecord, TaskStatus};
use delegate_tools::CapabilityRegistry;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::ManagerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::SubmitError;
use crate::pool::WorkerPool;
use crate::store::RecordStore;
use crate::trace::{SpanBridge, TraceBridge};
use crate::waiter::{self, WaitSummary};

/// Result lookup for one id.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultState {
    /// The task is terminal
    Ready(TaskOutcome),
    /// Still pending or running
    NotReady(TaskStatus),
    /// No such task
    NotFound,
}

impl ResultState {
    /// Whether a terminal outcome is available.
    pub fn is_ready(&self) -> bool {
        matches!(self, ResultState::Ready(_))
    }
}

/// Read-only projection of the manager's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatistics {
    /// Records ever created
    pub total_submitted: usize,
    /// Waiting for a worker
    pub pending: usize,
    /// Being executed
    pub running: usize,
    /// Finished with a value
    pub succeeded: usize,
    /// Finished with an error
    pub failed: usize,
    /// Registered tool names
    pub available_tools: Vec<String>,
    /// Registered managed agent names
    pub available_agents: Vec<String>,
}

/// Owns the record store, the dispatcher and the worker pool.
///
/// Share it with `Arc`; every method takes `&self`. Submission and reads
/// never await; only [`wait_for_tasks`](Self::wait_for_tasks) and
/// [`sleep`](Self::sleep) suspend the caller.
pub struct TaskManager {
    config: ManagerConfig,
    store: Arc<RecordStore>,
    dispatcher: Dispatcher,
    pool: Mutex<Option<WorkerPool>>,
}

impl TaskManager {
    /// Start a manager with the `tracing` bridge. Must be called inside a
    /// tokio runtime.
    pub fn start(registry: CapabilityRegistry, config: ManagerConfig) -> Self {
        Self::with_bridge(registry, config, Arc::new(SpanBridge))
    }

    /// Start a manager with a custom trace bridge.
    pub fn with_bridge(
        registry: CapabilityRegistry,
        config: ManagerConfig,
        bridge: Arc<dyn TraceBridge>,
    ) -> Self {
        let store = Arc::new(RecordStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(
            config.worker_count(),
            rx,
            Arc::clone(&store),
            Arc::clone(&bridge),
        );
        let dispatcher = Dispatcher::new(registry, Arc::clone(&store), bridge, tx);

        info!(
            workers = pool.size(),
            tools = ?dispatcher.registry().tool_names(),
            agents = ?dispatcher.registry().agent_names(),
            "TaskManager started"
        );

        Self {
            config,
            store,
            dispatcher,
            pool: Mutex::new(Some(pool)),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Registered capabilities.
    pub fn registry(&self) -> &CapabilityRegistry {
        self.dispatcher.registry()
    }

    /// Submit a task and return its generated id immediately.
    pub fn submit_task(
        &self,
        kind: TaskKind,
        target: &str,
        arguments: Arguments,
    ) -> Result<TaskId, SubmitError> {
        self.dispatcher.submit(None, kind, target, arguments)
    }

    /// Submit a task under a caller-chosen id.
    pub fn submit_task_with_id(
        &self,
        id: TaskId,
        kind: TaskKind,
        target: &str,
        arguments: Arguments,
    ) -> Result<TaskId, SubmitError> {
        self.dispatcher.submit(Some(id), kind, target, arguments)
    }

    /// Wait until every id is terminal (or unknown), or `max_wait` passes.
    pub async fn wait_for_tasks(&self, ids: &[TaskId], max_wait: Duration) -> WaitSummary {
        waiter::wait_for(&self.store, ids, max_wait).await
    }

    /// Pause the caller. The delay is clamped to `max_sleep`; returns the
    /// delay actually applied.
    pub async fn sleep(&self, duration: Duration, reason: &str) -> Duration {
        let slept = duration.min(self.config.max_sleep);
        info!(seconds = slept.as_secs_f64(), reason, "Sleeping");
        tokio::time::sleep(slept).await;
        slept
    }

    /// Current result of each id. Never waits for execution.
    pub fn get_task_results(&self, ids: &[TaskId]) -> BTreeMap<TaskId, ResultState> {
        ids.iter()
            .map(|id| {
                let state = match self.store.get(id) {
                    None => ResultState::NotFound,
                    Some(record) => match record.outcome {
                        Some(outcome) => ResultState::Ready(outcome),
                        None => ResultState::NotReady(record.status),
                    },
                };
                (id.clone(), state)
            })
            .collect()
    }

    /// Copy of one record.
    pub fn check_task(&self, id: &TaskId) -> Option<TaskRecord> {
        self.store.get(id)
    }

    /// Every record, in submission order.
    pub fn list_tasks(&self) -> Vec<TaskRecord> {
        self.store.snapshot()
    }

    /// Records matching `filter`.
    pub fn list_tasks_filtered(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        let mut records: Vec<_> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect();
        if filter.newest_first {
            records.reverse();
        }
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        records
    }

    /// Counts per status and registered capability names.
    pub fn statistics(&self) -> TaskStatistics {
        let counts = self.store.counts();
        TaskStatistics {
            total_submitted: counts.total(),
            pending: counts.pending,
            running: counts.running,
            succeeded: counts.succeeded,
            failed: counts.failed,
            available_tools: self.registry().tool_names(),
            available_agents: self.registry().agent_names(),
        }
    }

    /// Whether submissions are still accepted.
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_open()
    }

    /// Stop accepting submissions, let the workers finish queued and
    /// in-flight tasks, then join them. Calling it twice is a no-op.
    pub async fn shutdown(&self) {
        self.dispatcher.close();
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pool) = pool {
            info!("TaskManager shutting down");
            pool.join().await;
        }
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("config", &self.config)
            .field("tasks", &self.store.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NoopBridge;
    use crate::waiter::{WaitOutcome, WaitStatus};
    use delegate_tools::{DelayTool, EchoTool};
    use serde_json::json;

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    fn manager(workers: usize) -> TaskManager {
        let registry = CapabilityRegistry::new()
            .with_tool(Arc::new(EchoTool))
            .with_tool(Arc::new(DelayTool));
        TaskManager::with_bridge(
            registry,
            ManagerConfig::new().with_max_workers(workers),
            Arc::new(NoopBridge),
        )
    }

    #[tokio::test]
    async fn test_submit_then_collect() {
        let manager = manager(2);
        let id = manager
            .submit_task(TaskKind::Tool, "echo", args(json!({"q": "rust"})))
            .unwrap();

        let summary = manager.wait_for_tasks(&[id.clone()], Duration::from_secs(5)).await;
        assert_eq!(summary.outcome, WaitOutcome::Completed);

        let results = manager.get_task_results(&[id.clone()]);
        assert_eq!(
            results[&id],
            ResultState::Ready(TaskOutcome::Succeeded { value: json!({"q": "rust"}) })
        );

        let record = manager.check_task(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert!(record.run_time().is_some());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_results_never_block() {
        let manager = manager(1);
        let slow = manager
            .submit_task(TaskKind::Tool, "delay", args(json!({"millis": 300})))
            .unwrap();
        let ghost = TaskId::from("ghost");

        let started = std::time::Instant::now();
        let results = manager.get_task_results(&[slow.clone(), ghost.clone()]);
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(matches!(results[&slow], ResultState::NotReady(_)));
        assert_eq!(results[&ghost], ResultState::NotFound);
        assert!(manager.check_task(&ghost).is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_task_reported() {
        let manager = manager(1);
        let id = manager
            .submit_task(TaskKind::Tool, "delay", args(json!({"millis": 1, "fail": true})))
            .unwrap();
        let summary = manager.wait_for_tasks(&[id.clone()], Duration::from_secs(5)).await;
        assert_eq!(summary.status_of(&id), Some(WaitStatus::Failed));

        match &manager.get_task_results(&[id.clone()])[&id] {
            ResultState::Ready(outcome) => assert!(outcome.error().is_some()),
            other => panic!("unexpected state {:?}", other),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_filtered_listing_and_statistics() {
        let manager = manager(2);
        let ids: Vec<_> = (0..4)
            .map(|i| {
                manager
                    .submit_task(TaskKind::Tool, "echo", args(json!({"n": i})))
                    .unwrap()
            })
            .collect();
        manager.wait_for_tasks(&ids, Duration::from_secs(5)).await;

        let all = manager.list_tasks();
        assert_eq!(all.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), ids);

        let newest = manager.list_tasks_filtered(&TaskFilter {
            status: Some(TaskStatus::Succeeded),
            limit: Some(2),
            newest_first: true,
        });
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].id, ids[3]);
        assert_eq!(newest[1].id, ids[2]);

        assert!(manager
            .list_tasks_filtered(&TaskFilter {
                status: Some(TaskStatus::Failed),
                ..Default::default()
            })
            .is_empty());

        let stats = manager.statistics();
        assert_eq!(stats.total_submitted, 4);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.available_tools, vec!["delay", "echo"]);
        assert!(stats.available_agents.is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects() {
        let manager = manager(1);
        let ids: Vec<_> = (0..3)
            .map(|_| {
                manager
                    .submit_task(TaskKind::Tool, "delay", args(json!({"millis": 20})))
                    .unwrap()
            })
            .collect();

        manager.shutdown().await;
        assert!(!manager.is_running());
        for id in &ids {
            assert_eq!(manager.check_task(id).unwrap().status, TaskStatus::Succeeded);
        }

        assert_eq!(
            manager
                .submit_task(TaskKind::Tool, "echo", Arguments::new())
                .unwrap_err(),
            SubmitError::ShutDown
        );
        // second shutdown is a no-op
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_clamped() {
        let registry = CapabilityRegistry::new();
        let manager = TaskManager::with_bridge(
            registry,
            ManagerConfig::new().with_max_sleep(Duration::from_secs(5)),
            Arc::new(NoopBridge),
        );
        let start = tokio::time::Instant::now();
        let slept = manager.sleep(Duration::from_secs(600), "waiting for data").await;
        assert_eq!(slept, Duration::from_secs(5));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(600));
        manager.shutdown().await;
    }

    mod tracing_nesting {
        use super::*;
        use std::sync::Mutex;
        use tracing::span::{Attributes, Id};
        use tracing::Subscriber;
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::registry::LookupSpan;
        use tracing_subscriber::Layer;

        /// Records `(span, parent)` name pairs.
        #[derive(Clone, Default)]
        struct ParentRecorder {
            spans: Arc<Mutex<Vec<(String, Option<String>)>>>,
        }

        impl ParentRecorder {
            fn parent_of(&self, name: &str) -> Vec<Option<String>> {
                self.spans
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(span, _)| span == name)
                    .map(|(_, parent)| parent.clone())
                    .collect()
            }
        }

        impl<S> Layer<S> for ParentRecorder
        where
            S: Subscriber + for<'a> LookupSpan<'a>,
        {
            fn on_new_span(&self, _attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
                if let Some(span) = ctx.span(id) {
                    let parent = span.parent().map(|p| p.name().to_string());
                    self.spans
                        .lock()
                        .unwrap()
                        .push((span.name().to_string(), parent));
                }
            }
        }

        struct SpanOpener;

        #[async_trait::async_trait]
        impl delegate_tools::Tool for SpanOpener {
            fn name(&self) -> &str {
                "span_opener"
            }

            fn description(&self) -> &str {
                "Opens a span inside the task body"
            }

            async fn invoke(&self, _arguments: &Arguments) -> Result<serde_json::Value, anyhow::Error> {
                let span = tracing::info_span!("body_work");
                drop(span);
                Ok(json!(null))
            }

            fn schema(&self) -> delegate_tools::ToolSchema {
                delegate_tools::ToolSchema::new("span_opener", "test tool")
            }
        }

        #[tokio::test]
        async fn test_task_span_nests_under_submitter() {
            let recorder = ParentRecorder::default();
            let _guard = tracing::subscriber::set_default(
                tracing_subscriber::registry().with(recorder.clone()),
            );

            let manager = TaskManager::start(
                CapabilityRegistry::new().with_tool(Arc::new(SpanOpener)),
                ManagerConfig::new().with_max_workers(2),
            );

            let control = tracing::info_span!("control_loop");
            let nested = control
                .in_scope(|| manager.submit_task(TaskKind::Tool, "span_opener", Arguments::new()))
                .unwrap();
            let detached = manager
                .submit_task(TaskKind::Tool, "span_opener", Arguments::new())
                .unwrap();

            let summary = manager
                .wait_for_tasks(&[nested, detached], Duration::from_secs(5))
                .await;
            assert_eq!(summary.outcome, WaitOutcome::Completed);
            manager.shutdown().await;

            let mut task_parents = recorder.parent_of("task");
            task_parents.sort();
            assert_eq!(task_parents, vec![None, Some("control_loop".to_string())]);
            assert_eq!(
                recorder.parent_of("body_work"),
                vec![Some("task".to_string()), Some("task".to_string())]
            );
        }
    }
}
