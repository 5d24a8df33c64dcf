//! Prompt text that teaches a control loop how to use the control tools.

/// Appended to the control loop's system prompt.
pub const ASYNC_GUIDANCE: &str = r#"
## Asynchronous task management

You can run independent pieces of work in the background and collect their
results later.

### Workflow
1. Split the request into sub-tasks that do not depend on each other.
2. Queue each one with `submit_task` and keep the returned task id.
3. Wait with `wait_for_tasks` (preferred) or `sleep`.
4. Collect everything at once with `get_task_results`.
5. Combine the results into the final answer.

### Tools
- `submit_task`: queue a `tool` or `managed_agent` call; returns a task id
- `wait_for_tasks`: wait until the given tasks finish or a timeout passes
- `sleep`: pause for a number of seconds
- `get_task_results`: results of several tasks at once
- `check_task`: status and result of one task
- `list_tasks`: recent tasks and their status

### Reading results
`get_task_results` ends with a line `# RESULTS_DICT_JSON: {...}`. The JSON
object maps each task id to its result, or to `FAILED - <error>`, `PENDING`,
`RUNNING` or `NOT FOUND`. Parse that line instead of the human summary.

### Example
```
a = submit_task("tool", "search", {"query": "rust async runtimes"})
b = submit_task("managed_agent", "analyst", {"topic": "tokio"})
wait_for_tasks([a, b], max_wait_time=30)
results = get_task_results([a, b])
```

### Rules
- Submitting returns immediately; never read results right after submitting.
- A timeout only stops the waiting. The task keeps running, so wait again or check later.
- Check for failed tasks and have a fallback.
- Feed one task's result into the next submission when steps depend on each other.
"#;

/// Per-request hint appended to a task given to the control loop.
pub const ASYNC_TASK_HINT: &str = "\
---
Hint: if this request splits into independent sub-tasks, submit them with \
submit_task, wait with wait_for_tasks, then collect them with get_task_results.";

/// System prompt with [`ASYNC_GUIDANCE`] appended.
pub fn with_guidance(system_prompt: &str) -> String {
    let base = system_prompt.trim_end();
    if base.is_empty() {
        ASYNC_GUIDANCE.trim().to_string()
    } else {
        format!("{}\n{}", base, ASYNC_GUIDANCE)
    }
}

/// Task text with [`ASYNC_TASK_HINT`] appended.
pub fn with_task_hint(task: &str) -> String {
    format!("{}\n\n{}", task.trim_end(), ASYNC_TASK_HINT)
}
