//! Control-loop interface.
//!
//! Exposes the task manager's six operations as tools an LLM control loop
//! can call, renders their results as text, and carries the guidance prompt
//! that explains how to use them.

#![warn(missing_docs)]

pub mod control;
pub mod render;
pub mod guidance;
pub mod toolkit;

pub use control::{
    control_tools, CheckTaskTool, GetTaskResultsTool, ListTasksTool, SleepTool, SubmitTaskTool,
    WaitForTasksTool, CONTROL_TOOL_NAMES,
};
pub use render::{parse_task_results, RESULTS_MARKER};
pub use guidance::{with_guidance, with_task_hint, ASYNC_GUIDANCE, ASYNC_TASK_HINT};
pub use toolkit::AsyncToolkit;
