//! The six control-surface operations, exposed as tools a control loop can
//! call.
//!
//! Every tool closes over one shared [`TaskManager`]; there is no global
//! manager.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use delegate_core::{Arguments, TaskFilter, TaskId, TaskKind, TaskStatus};
use delegate_execution::TaskManager;
use delegate_tools::{Parameter, Tool, ToolSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::render;

/// Names of the control tools, in the order they are registered.
pub const CONTROL_TOOL_NAMES: [&str; 6] = [
    "submit_task",
    "wait_for_tasks",
    "sleep",
    "get_task_results",
    "check_task",
    "list_tasks",
];

const DEFAULT_LIST_LIMIT: usize = 10;

/// All six control tools over one manager.
pub fn control_tools(manager: &Arc<TaskManager>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(SubmitTaskTool::new(Arc::clone(manager))),
        Arc::new(WaitForTasksTool::new(Arc::clone(manager))),
        Arc::new(SleepTool::new(Arc::clone(manager))),
        Arc::new(GetTaskResultsTool::new(Arc::clone(manager))),
        Arc::new(CheckTaskTool::new(Arc::clone(manager))),
        Arc::new(ListTasksTool::new(Arc::clone(manager))),
    ]
}

/// Deserialize tool arguments into a typed input.
fn parse<T: DeserializeOwned>(tool: &str, arguments: &Arguments) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(arguments.clone()))
        .with_context(|| format!("invalid arguments for {}", tool))
}

fn to_ids(raw: Vec<String>) -> Vec<TaskId> {
    raw.into_iter().map(TaskId::from).collect()
}

macro_rules! control_tool {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            manager: Arc<TaskManager>,
        }

        impl $name {
            /// Create the tool over a shared manager.
            pub fn new(manager: Arc<TaskManager>) -> Self {
                Self { manager }
            }
        }
    };
}

control_tool!(
    /// `submit_task`: queue a tool or managed agent for background execution.
    SubmitTaskTool
);

#[derive(Deserialize)]
struct SubmitInput {
    task_type: String,
    target_name: String,
    #[serde(default)]
    arguments: Arguments,
    #[serde(default)]
    task_id: Option<String>,
}

#[async_trait]
impl Tool for SubmitTaskTool {
    fn name(&self) -> &str {
        "submit_task"
    }

    fn description(&self) -> &str {
        "Submit a task for asynchronous execution. Returns a task id for checking status and results."
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let input: SubmitInput = parse(self.name(), arguments)?;
        let kind: TaskKind = input.task_type.parse().map_err(anyhow::Error::msg)?;

        let submitted = match input.task_id {
            Some(id) => self.manager.submit_task_with_id(
                TaskId::from(id),
                kind,
                &input.target_name,
                input.arguments,
            ),
            None => self
                .manager
                .submit_task(kind, &input.target_name, input.arguments),
        };
        let id = submitted.context("Failed to submit task")?;

        Ok(Value::String(format!(
            "Task submitted successfully! Task ID: {}",
            id
        )))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description())
            .param(Parameter::required(
                "task_type",
                "string",
                "Type of task: 'tool' or 'managed_agent'",
            ))
            .param(Parameter::required(
                "target_name",
                "string",
                "Name of the tool or managed agent to execute",
            ))
            .param(Parameter::required(
                "arguments",
                "object",
                "Arguments to pass to the tool or managed agent",
            ))
            .param(Parameter::optional(
                "task_id",
                "string",
                "Custom task id; generated when omitted",
            ))
    }
}

control_tool!(
    /// `wait_for_tasks`: block until the given tasks finish or a timeout
    /// passes.
    WaitForTasksTool
);

#[derive(Deserialize)]
struct WaitInput {
    task_ids: Vec<String>,
    #[serde(default)]
    max_wait_time: Option<f64>,
}

#[async_trait]
impl Tool for WaitForTasksTool {
    fn name(&self) -> &str {
        "wait_for_tasks"
    }

    fn description(&self) -> &str {
        "Wait until the given tasks have finished (succeeded or failed), or until max_wait_time seconds pass."
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let input: WaitInput = parse(self.name(), arguments)?;
        if input.task_ids.is_empty() {
            return Ok(Value::String("No task IDs provided".to_string()));
        }

        let max_wait = match input.max_wait_time {
            Some(seconds) => Duration::try_from_secs_f64(seconds)
                .with_context(|| format!("invalid max_wait_time {}", seconds))?,
            None => self.manager.config().default_wait,
        };

        let summary = self
            .manager
            .wait_for_tasks(&to_ids(input.task_ids), max_wait)
            .await;
        Ok(Value::String(render::wait_summary(&summary)))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description())
            .param(Parameter::required(
                "task_ids",
                "array",
                "List of task IDs to wait for",
            ))
            .param(
                Parameter::optional("max_wait_time", "number", "Maximum time to wait in seconds")
                    .with_default(json!(self.manager.config().default_wait.as_secs_f64())),
            )
    }
}

control_tool!(
    /// `sleep`: pause the control loop, e.g. before checking results again.
    SleepTool
);

#[derive(Deserialize)]
struct SleepInput {
    seconds: f64,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleep for a number of seconds, e.g. to give submitted tasks time to run before checking them."
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let input: SleepInput = parse(self.name(), arguments)?;
        if input.seconds.is_nan() || input.seconds < 0.0 {
            anyhow::bail!("Sleep duration cannot be negative");
        }
        let requested = Duration::try_from_secs_f64(input.seconds)
            .unwrap_or(self.manager.config().max_sleep);

        let reason = input.reason.unwrap_or_default();
        let slept = self.manager.sleep(requested, &reason).await;

        let reason = if reason.is_empty() {
            String::new()
        } else {
            format!(" (Reason: {})", reason)
        };
        Ok(Value::String(format!(
            "Slept for {} seconds{}. Ready to continue.",
            slept.as_secs_f64(),
            reason
        )))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description())
            .param(Parameter::required(
                "seconds",
                "number",
                "Seconds to sleep (decimals allowed)",
            ))
            .param(Parameter::optional("reason", "string", "Why, for the logs"))
    }
}

control_tool!(
    /// `get_task_results`: collect results of several tasks at once.
    GetTaskResultsTool
);

#[derive(Deserialize)]
struct ResultsInput {
    task_ids: Vec<String>,
    #[serde(default = "include_failed_default")]
    include_failed: bool,
}

fn include_failed_default() -> bool {
    true
}

#[async_trait]
impl Tool for GetTaskResultsTool {
    fn name(&self) -> &str {
        "get_task_results"
    }

    fn description(&self) -> &str {
        "Get results of several tasks at once. The last line is '# RESULTS_DICT_JSON: {...}', a JSON object mapping task id to result."
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let input: ResultsInput = parse(self.name(), arguments)?;
        let ids = to_ids(input.task_ids);
        let results = self.manager.get_task_results(&ids);
        debug!(tasks = ids.len(), "Collected task results");
        Ok(Value::String(render::task_results(
            &ids,
            &results,
            input.include_failed,
        )))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description())
            .param(Parameter::required(
                "task_ids",
                "array",
                "List of task IDs to get results for",
            ))
            .param(
                Parameter::optional("include_failed", "boolean", "Include failed tasks")
                    .with_default(json!(true)),
            )
    }
}

control_tool!(
    /// `check_task`: status and result of one task.
    CheckTaskTool
);

#[derive(Deserialize)]
struct CheckInput {
    task_id: String,
    #[serde(default)]
    format: Option<String>,
}

#[async_trait]
impl Tool for CheckTaskTool {
    fn name(&self) -> &str {
        "check_task"
    }

    fn description(&self) -> &str {
        "Check the status, timing and result or error of a submitted task."
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let input: CheckInput = parse(self.name(), arguments)?;
        let id = TaskId::from(input.task_id);
        let Some(record) = self.manager.check_task(&id) else {
            return Ok(Value::String(format!("Task not found: {}", id)));
        };

        let text = match input.format.as_deref() {
            Some("detailed") => render::task_detail(&record),
            _ => render::task_summary(&record),
        };
        Ok(Value::String(text))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description())
            .param(Parameter::required(
                "task_id",
                "string",
                "The task ID returned by submit_task",
            ))
            .param(
                Parameter::optional("format", "string", "'summary' or 'detailed'")
                    .with_default(json!("summary")),
            )
    }
}

control_tool!(
    /// `list_tasks`: newest tasks first, optionally filtered by status.
    ListTasksTool
);

#[derive(Deserialize)]
struct ListInput {
    #[serde(default)]
    status_filter: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List submitted tasks, newest first, with their status."
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let input: ListInput = parse(self.name(), arguments)?;
        let status = input
            .status_filter
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<TaskStatus>)
            .transpose()
            .map_err(anyhow::Error::msg)?;

        let filter = TaskFilter {
            status,
            limit: Some(input.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT)),
            newest_first: true,
        };
        let records = self.manager.list_tasks_filtered(&filter);
        Ok(Value::String(render::task_list(
            &records,
            &self.manager.statistics(),
        )))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description())
            .param(Parameter::optional(
                "status_filter",
                "string",
                "Only tasks in this status: pending, running, succeeded, failed",
            ))
            .param(
                Parameter::optional("limit", "integer", "Maximum number of tasks to list")
                    .with_default(json!(DEFAULT_LIST_LIMIT)),
            )
    }
}
