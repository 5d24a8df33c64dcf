//! Plain-text renderings of control-surface results for the control loop.

use std::collections::BTreeMap;

use delegate_core::{TaskId, TaskOutcome, TaskRecord, TaskStatus, Time};
use delegate_execution::{ResultState, TaskStatistics, WaitOutcome, WaitSummary};
use serde_json::{Map, Value};

/// Prefix of the machine-readable line appended by `get_task_results`.
pub const RESULTS_MARKER: &str = "# RESULTS_DICT_JSON: ";

const RULE_WIDTH: usize = 50;

// Ids listed inline before eliding the rest
const INLINE_IDS: usize = 3;

/// Text for a finished `wait_for_tasks`.
pub fn wait_summary(summary: &WaitSummary) -> String {
    let seconds = summary.elapsed.as_secs_f64();
    let succeeded = summary.succeeded();
    let failed = summary.failed();

    let mut out = match summary.outcome {
        WaitOutcome::Completed => format!("All tasks finished in {:.1} seconds!\n", seconds),
        WaitOutcome::TimedOut => format!(
            "Timeout after {:.1} seconds. Some tasks may still be running.\n",
            seconds
        ),
    };
    out.push_str(&format!(
        "Succeeded: {}, Failed: {}\n",
        succeeded.len(),
        failed.len()
    ));

    let groups = [
        ("Succeeded tasks", succeeded),
        ("Failed tasks", failed),
        ("Still running", summary.unfinished()),
        ("Not found", summary.not_found()),
    ];
    for (label, ids) in groups {
        if !ids.is_empty() {
            out.push_str(&format!("{}: {}\n", label, inline_ids(&ids)));
        }
    }
    out
}

fn inline_ids(ids: &[&TaskId]) -> String {
    let shown: Vec<&str> = ids.iter().take(INLINE_IDS).map(|id| id.as_str()).collect();
    let more = if ids.len() > INLINE_IDS { "..." } else { "" };
    format!("{}{}", shown.join(", "), more)
}

/// Text for `get_task_results`: one line per id in request order, then the
/// [`RESULTS_MARKER`] line mapping each id to its value or state.
pub fn task_results(
    ids: &[TaskId],
    results: &BTreeMap<TaskId, ResultState>,
    include_failed: bool,
) -> String {
    if ids.is_empty() {
        return format!("No task IDs provided\n\n{}{{}}", RESULTS_MARKER);
    }

    let mut lines = Vec::with_capacity(ids.len());
    let mut dict = Map::new();
    let (mut succeeded, mut failed) = (0, 0);

    for id in ids {
        if dict.contains_key(id.as_str()) {
            continue;
        }
        match results.get(id).unwrap_or(&ResultState::NotFound) {
            ResultState::Ready(TaskOutcome::Succeeded { value }) => {
                succeeded += 1;
                lines.push(format!("✅ Task {}: {}", id, value_text(value)));
                dict.insert(id.to_string(), value.clone());
            }
            ResultState::Ready(TaskOutcome::Failed { error }) => {
                if include_failed {
                    failed += 1;
                    lines.push(format!("❌ Task {}: FAILED - {}", id, error));
                    dict.insert(id.to_string(), Value::String(format!("FAILED - {}", error)));
                }
            }
            ResultState::NotReady(status) => {
                let status = upper(*status);
                lines.push(format!("⏳ Task {}: {}", id, status));
                dict.insert(id.to_string(), Value::String(status));
            }
            ResultState::NotFound => {
                lines.push(format!("❌ Task {}: NOT FOUND", id));
                dict.insert(id.to_string(), Value::String("NOT FOUND".to_string()));
            }
        }
    }

    format!(
        "Results Summary: {} succeeded, {} failed\n{}\n{}\n\n{}{}",
        succeeded,
        failed,
        "=".repeat(RULE_WIDTH),
        lines.join("\n"),
        RESULTS_MARKER,
        Value::Object(dict)
    )
}

/// Extract the id -> result map from `get_task_results` text.
pub fn parse_task_results(text: &str) -> Option<Map<String, Value>> {
    let line = text
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULTS_MARKER))?;
    match serde_json::from_str(line.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// One-paragraph view of a record for `check_task`.
pub fn task_summary(record: &TaskRecord) -> String {
    let head = format!("Task {}: {}", record.id, upper(record.status));
    match &record.outcome {
        Some(TaskOutcome::Succeeded { value }) => format!("{}\nResult: {}", head, value_text(value)),
        Some(TaskOutcome::Failed { error }) => format!("{}\nError: {}", head, error),
        None => head,
    }
}

/// Full view of a record for `check_task` with `format = "detailed"`.
pub fn task_detail(record: &TaskRecord) -> String {
    let mut lines = vec![
        format!("Task ID: {}", record.id),
        format!("Type: {}", record.kind),
        format!("Target: {}", record.target),
        format!("Status: {}", upper(record.status)),
        format!("Submitted: {}", timestamp(&record.submitted_at)),
    ];
    if let Some(started) = &record.started_at {
        lines.push(format!("Started: {}", timestamp(started)));
    }
    if let Some(completed) = &record.completed_at {
        lines.push(format!("Completed: {}", timestamp(completed)));
    }
    if let Some(run_time) = record.run_time() {
        lines.push(format!("Duration: {:.2}s", seconds(run_time)));
    }
    if let Some(turnaround) = record.turnaround() {
        lines.push(format!("Turnaround: {:.2}s", seconds(turnaround)));
    }
    lines.push(format!(
        "Arguments: {}",
        serde_json::to_string_pretty(&record.arguments).unwrap_or_else(|_| "{}".to_string())
    ));
    match &record.outcome {
        Some(TaskOutcome::Succeeded { value }) => lines.push(format!("Result: {}", value_text(value))),
        Some(TaskOutcome::Failed { error }) => {
            lines.push(format!("Error: {}", error));
            if let Some(detail) = &error.detail {
                lines.push(format!("Detail: {}", detail));
            }
        }
        None => {}
    }
    lines.join("\n")
}

/// Listing for `list_tasks`, with a statistics footer.
pub fn task_list(records: &[TaskRecord], stats: &TaskStatistics) -> String {
    if records.is_empty() {
        return "No tasks found.".to_string();
    }

    let rule = "-".repeat(RULE_WIDTH);
    let mut lines = vec![format!("Found {} task(s):", records.len()), rule.clone()];
    for record in records {
        let run_time = record
            .run_time()
            .map(|d| format!(" ({:.1}s)", seconds(d)))
            .unwrap_or_default();
        lines.push(format!(
            "• {} | {} | {}:{}{}",
            record.id,
            upper(record.status),
            record.kind,
            record.target,
            run_time
        ));
    }
    lines.push(rule);
    lines.push(statistics_line(stats));
    lines.join("\n")
}

/// `Total: n | Succeeded: n | ...` footer.
pub fn statistics_line(stats: &TaskStatistics) -> String {
    format!(
        "Total: {} | Succeeded: {} | Failed: {} | Pending: {} | Running: {}",
        stats.total_submitted, stats.succeeded, stats.failed, stats.pending, stats.running
    )
}

fn upper(status: TaskStatus) -> String {
    status.as_str().to_ascii_uppercase()
}

// Strings render bare, everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn timestamp(time: &Time) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string()
}

fn seconds(duration: chrono::Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegate_core::{Arguments, TaskFailure, TaskKind, TraceContext};
    use delegate_execution::WaitStatus;
    use serde_json::json;
    use std::time::Duration;

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    #[test]
    fn test_wait_summary_completed() {
        let summary = WaitSummary {
            outcome: WaitOutcome::Completed,
            elapsed: Duration::from_millis(1040),
            entries: vec![
                (id("a"), WaitStatus::Succeeded),
                (id("b"), WaitStatus::Failed),
                (id("c"), WaitStatus::Succeeded),
            ],
        };
        let text = wait_summary(&summary);
        assert!(text.starts_with("All tasks finished in 1.0 seconds!"));
        assert!(text.contains("Succeeded: 2, Failed: 1"));
        assert!(text.contains("Succeeded tasks: a, c\n"));
        assert!(text.contains("Failed tasks: b\n"));
        assert!(!text.contains("Still running"));
    }

    #[test]
    fn test_wait_summary_timeout_lists_unfinished() {
        let summary = WaitSummary {
            outcome: WaitOutcome::TimedOut,
            elapsed: Duration::from_millis(100),
            entries: (0..5)
                .map(|i| (id(&format!("t{}", i)), WaitStatus::Running))
                .collect(),
        };
        let text = wait_summary(&summary);
        assert!(text.starts_with("Timeout after 0.1 seconds."));
        assert!(text.contains("Succeeded: 0, Failed: 0"));
        assert!(text.contains("Still running: t0, t1, t2...\n"));
    }

    #[test]
    fn test_results_text_and_marker() {
        let ids = vec![id("ok"), id("bad"), id("slow"), id("ghost")];
        let mut results = BTreeMap::new();
        results.insert(
            id("ok"),
            ResultState::Ready(TaskOutcome::Succeeded { value: json!("42 rows") }),
        );
        results.insert(
            id("bad"),
            ResultState::Ready(TaskOutcome::Failed {
                error: TaskFailure::from_error(&anyhow::anyhow!("quota exceeded")),
            }),
        );
        results.insert(id("slow"), ResultState::NotReady(TaskStatus::Running));
        results.insert(id("ghost"), ResultState::NotFound);

        let text = task_results(&ids, &results, true);
        assert!(text.starts_with("Results Summary: 1 succeeded, 1 failed\n"));
        assert!(text.contains("✅ Task ok: 42 rows"));
        assert!(text.contains("❌ Task bad: FAILED - quota exceeded"));
        assert!(text.contains("⏳ Task slow: RUNNING"));
        assert!(text.contains("❌ Task ghost: NOT FOUND"));

        let dict = parse_task_results(&text).unwrap();
        assert_eq!(
            Value::Object(dict),
            json!({
                "ok": "42 rows",
                "bad": "FAILED - quota exceeded",
                "slow": "RUNNING",
                "ghost": "NOT FOUND",
            })
        );
    }

    #[test]
    fn test_results_can_skip_failed() {
        let ids = vec![id("bad")];
        let mut results = BTreeMap::new();
        results.insert(
            id("bad"),
            ResultState::Ready(TaskOutcome::Failed {
                error: TaskFailure::from_error(&anyhow::anyhow!("boom")),
            }),
        );
        let text = task_results(&ids, &results, false);
        assert!(text.starts_with("Results Summary: 0 succeeded, 0 failed"));
        assert!(parse_task_results(&text).unwrap().is_empty());
    }

    #[test]
    fn test_results_keep_structured_values() {
        let ids = vec![id("q")];
        let mut results = BTreeMap::new();
        results.insert(
            id("q"),
            ResultState::Ready(TaskOutcome::Succeeded { value: json!({"rows": [1, 2]}) }),
        );
        let dict = parse_task_results(&task_results(&ids, &results, true)).unwrap();
        assert_eq!(dict["q"], json!({"rows": [1, 2]}));
    }

    #[test]
    fn test_empty_results() {
        let text = task_results(&[], &BTreeMap::new(), true);
        assert!(text.starts_with("No task IDs provided"));
        assert!(parse_task_results(&text).unwrap().is_empty());
        assert!(parse_task_results("no marker here").is_none());
    }

    #[test]
    fn test_record_views() {
        let mut arguments = Arguments::new();
        arguments.insert("query".into(), json!("rust"));
        let mut record = TaskRecord::new(
            id("task_1"),
            TaskKind::Tool,
            "search",
            arguments,
            TraceContext::detached(),
        );
        assert_eq!(task_summary(&record), "Task task_1: PENDING");

        let now = chrono::Utc::now();
        record.status = TaskStatus::Succeeded;
        record.submitted_at = now - chrono::Duration::milliseconds(500);
        record.started_at = Some(now);
        record.completed_at = Some(now + chrono::Duration::milliseconds(1500));
        record.outcome = Some(TaskOutcome::Succeeded { value: json!(3) });

        assert_eq!(task_summary(&record), "Task task_1: SUCCEEDED\nResult: 3");
        let detail = task_detail(&record);
        assert!(detail.contains("Type: tool"));
        assert!(detail.contains("Target: search"));
        assert!(detail.contains("Duration: 1.50s"));
        assert!(detail.contains("Turnaround: 2.00s"));
        assert!(detail.contains("\"query\": \"rust\""));

        let stats = TaskStatistics {
            total_submitted: 1,
            succeeded: 1,
            ..Default::default()
        };
        let list = task_list(&[record], &stats);
        assert!(list.starts_with("Found 1 task(s):"));
        assert!(list.contains("• task_1 | SUCCEEDED | tool:search (1.5s)"));
        assert!(list.ends_with("Total: 1 | Succeeded: 1 | Failed: 0 | Pending: 0 | Running: 0"));
    }
}
