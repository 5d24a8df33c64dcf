//! Demo scenarios driven through the control tools, the way a control loop
//! would call them.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use delegate_ai::{parse_task_results, AsyncToolkit};
use delegate_core::Arguments;
use delegate_execution::ManagerConfig;
use delegate_tools::{DelayTool, EchoTool, ManagedAgent, ShellTool};
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};

/// Managed agent that "researches" a topic by waiting a little.
pub struct Researcher;

#[async_trait]
impl ManagedAgent for Researcher {
    fn name(&self) -> &str {
        "researcher"
    }

    fn description(&self) -> &str {
        "Looks into a topic and reports a one-line finding"
    }

    async fn run(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let topic = arguments
            .get("topic")
            .and_then(Value::as_str)
            .context("'topic' is required")?;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        Ok(json!(format!("{} looks promising", topic)))
    }
}

/// Toolkit over the built-in tools plus [`Researcher`].
pub fn toolkit(config: ManagerConfig) -> AsyncToolkit {
    AsyncToolkit::new(
        vec![Arc::new(EchoTool), Arc::new(DelayTool), Arc::new(ShellTool)],
        vec![Arc::new(Researcher)],
        config,
    )
}

fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}

async fn call(toolkit: &AsyncToolkit, name: &str, arguments: Value) -> anyhow::Result<String> {
    let reply = toolkit.call(name, &args(arguments)).await?;
    let text = match reply {
        Value::String(text) => text,
        other => other.to_string(),
    };
    println!(">>> {}\n{}\n", name, text);
    Ok(text)
}

async fn submit(toolkit: &AsyncToolkit, task_type: &str, target: &str, arguments: Value) -> anyhow::Result<String> {
    let reply = call(
        toolkit,
        "submit_task",
        json!({ "task_type": task_type, "target_name": target, "arguments": arguments }),
    )
    .await?;
    reply
        .rsplit(' ')
        .next()
        .map(str::to_string)
        .context("submit_task reply carried no task id")
}

/// Parallel batch: `tasks` delays of `delay_ms` each.
pub async fn parallel(toolkit: &AsyncToolkit, tasks: usize, delay_ms: u64) -> anyhow::Result<()> {
    println!("== parallel: {} tasks x {}ms ==\n", tasks, delay_ms);
    let mut ids = Vec::with_capacity(tasks);
    for n in 0..tasks {
        let label = format!("batch-{}", n);
        ids.push(submit(toolkit, "tool", "delay", json!({ "millis": delay_ms, "label": label })).await?);
    }
    ids.push(submit(toolkit, "managed_agent", "researcher", json!({ "topic": "work stealing" })).await?);

    call(toolkit, "wait_for_tasks", json!({ "task_ids": ids, "max_wait_time": 30 })).await?;
    let results = call(toolkit, "get_task_results", json!({ "task_ids": ids })).await?;

    let parsed = parse_task_results(&results).context("results line missing")?;
    info!(collected = parsed.len(), "Parsed results");
    Ok(())
}

/// A failing task next to a healthy one.
pub async fn failure(toolkit: &AsyncToolkit) -> anyhow::Result<()> {
    println!("== failure ==\n");
    let bad = submit(toolkit, "tool", "delay", json!({ "millis": 50, "fail": true })).await?;
    let good = submit(toolkit, "tool", "echo", json!({ "after": "failure" })).await?;

    call(toolkit, "wait_for_tasks", json!({ "task_ids": [bad, good] })).await?;
    call(toolkit, "check_task", json!({ "task_id": bad, "format": "detailed" })).await?;
    call(toolkit, "check_task", json!({ "task_id": good })).await?;
    Ok(())
}

/// A wait that times out, then a later collection.
pub async fn timeout(toolkit: &AsyncToolkit) -> anyhow::Result<()> {
    println!("== timeout ==\n");
    let slow = submit(toolkit, "tool", "delay", json!({ "millis": 1000 })).await?;

    call(toolkit, "wait_for_tasks", json!({ "task_ids": [slow], "max_wait_time": 0.1 })).await?;
    call(toolkit, "sleep", json!({ "seconds": 1.5, "reason": "slow task still running" })).await?;
    call(toolkit, "get_task_results", json!({ "task_ids": [slow] })).await?;
    call(toolkit, "list_tasks", json!({})).await?;
    Ok(())
}

/// Run every scenario under one `control_loop` span.
pub async fn run(config: ManagerConfig, tasks: usize, delay_ms: u64) -> anyhow::Result<()> {
    let toolkit = toolkit(config);
    let outcome = async {
        parallel(&toolkit, tasks, delay_ms).await?;
        failure(&toolkit).await?;
        timeout(&toolkit).await
    }
    .instrument(info_span!("control_loop"))
    .await;

    toolkit.shutdown().await;
    outcome
}
