//! Built-in tools (Echo, Delay, Shell).

use super::r#trait::*;
use anyhow::Context;
use async_trait::async_trait;
use delegate_core::Arguments;
use serde_json::{json, Value};
use tokio::process::Command;

/// Returns its arguments unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given arguments unchanged"
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        Ok(Value::Object(arguments.clone()))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("echo", "Return the given arguments unchanged")
    }
}

/// Sleeps for a while, then reports how long it slept.
///
/// Stands in for slow I/O-bound work (searches, page fetches) in demos.
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Wait for a number of milliseconds, then return"
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let millis = arguments
            .get("millis")
            .and_then(Value::as_u64)
            .context("'millis' must be a non-negative integer")?;
        let label = arguments.get("label").cloned().unwrap_or(Value::Null);

        tokio::time::sleep(std::time::Duration::from_millis(millis)).await;

        if arguments.get("fail").and_then(Value::as_bool).unwrap_or(false) {
            anyhow::bail!("delay {} failed on request after {}ms", label, millis);
        }

        Ok(json!({ "slept_ms": millis, "label": label }))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("delay", "Wait for a number of milliseconds, then return")
            .param(Parameter::required("millis", "integer", "How long to wait"))
            .param(Parameter::optional("label", "string", "Echoed back in the result"))
            .param(
                Parameter::optional("fail", "boolean", "Fail after waiting")
                    .with_default(json!(false)),
            )
    }
}

/// Runs a program and captures its output.
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a program with arguments and capture its output"
    }

    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        let start = std::time::Instant::now();

        let program = arguments
            .get("program")
            .and_then(Value::as_str)
            .context("'program' must be a string")?;
        let args: Vec<String> = match arguments.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .context("'args' must be an array of strings")?,
        };

        let mut cmd = Command::new(program);
        cmd.args(&args);

        if let Some(Value::Object(env)) = arguments.get("env") {
            for (k, v) in env {
                if let Some(v) = v.as_str() {
                    cmd.env(k, v);
                }
            }
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", program))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_code != 0 {
            anyhow::bail!("'{}' exited with {}: {}", program, exit_code, stderr.trim());
        }

        Ok(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": start.elapsed().as_millis() as u64,
        }))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("shell", "Run a program with arguments and capture its output")
            .param(Parameter::required("program", "string", "Program to run"))
            .param(Parameter::optional("args", "array", "Program arguments"))
            .param(Parameter::optional("env", "object", "Extra environment variables"))
    }
}
