//! Execution tools — run generated code and shell commands, stop processes.
//!
//! Both run tools wait up to the configured timeout. A process that is still
//! running afterwards keeps running in the background and can be stopped
//! with `stop_process` using the id in the result.

use async_trait::async_trait;
use patchloop_core::error::ToolError;
use patchloop_core::tool::{Tool, ToolArgs, ToolOutcome};
use tracing::{debug, warn};

use crate::ToolContext;
use crate::process::{ExecutionResult, ProcessId, ProcessStatus, StopOutcome};

/// Render an execution result the way the model sees it.
fn render(result: &ExecutionResult, timeout_secs: u64) -> String {
    let mut text = format!("Process ID: {}\n", result.id);
    if !result.stdout.is_empty() {
        text.push_str(&format!("\nStdout:\n{}\n", result.stdout.trim_end()));
    }
    if !result.stderr.is_empty() {
        text.push_str(&format!("\nStderr:\n{}\n", result.stderr.trim_end()));
    }
    match result.status {
        ProcessStatus::Exited(code) => text.push_str(&format!("\nReturn Code: {code}")),
        ProcessStatus::Running => text.push_str(&format!(
            "\nThe process is still running after {timeout_secs}s. \
             Use stop_process with process_id \"{}\" to stop it.",
            result.id
        )),
    }
    text
}

fn outcome(result: &ExecutionResult, text: String) -> ToolOutcome {
    match result.status {
        ProcessStatus::Exited(0) | ProcessStatus::Running => ToolOutcome::success(text),
        ProcessStatus::Exited(code) => {
            warn!(id = %result.id, exit_code = code, "Process failed");
            ToolOutcome::error(text)
        }
    }
}

async fn wait_for(ctx: &ToolContext, tool_name: &str, id: ProcessId) -> Result<ExecutionResult, ToolError> {
    ctx.processes
        .await_result(&id, ctx.timeout)
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        })
}

pub struct ExecuteCodeTool {
    ctx: ToolContext,
}

impl ExecuteCodeTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute code in the isolated execution environment and return its output and exit \
         code. Long-running code (servers, watchers) keeps running in the background; the \
         result then includes a process id for stop_process."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let code = args.required_str("code")?;
        let id = self
            .ctx
            .processes
            .spawn(code)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        debug!(id = %id, "Started code execution");

        let result = wait_for(&self.ctx, self.name(), id).await?;
        let mut text = render(&result, self.ctx.timeout.as_secs());
        if let Some(analyzer) = &self.ctx.analyzer
            && let Some(analysis) = analyzer.analyze(code, &result).await
        {
            text.push_str("\n\nAnalysis:\n");
            text.push_str(analysis.trim());
        }
        Ok(outcome(&result, text))
    }
}

pub struct RunShellCommandTool {
    ctx: ToolContext,
}

impl RunShellCommandTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for RunShellCommandTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the project root and return stdout, stderr and the exit code. \
         Use this for installing dependencies, running tests, git and similar tasks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let command = args.required_str("command")?;
        debug!(command, "Executing shell command");
        let id = self
            .ctx
            .processes
            .spawn_command(command, &self.ctx.root)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let result = wait_for(&self.ctx, self.name(), id).await?;
        let text = render(&result, self.ctx.timeout.as_secs());
        Ok(outcome(&result, text))
    }
}

pub struct StopProcessTool {
    ctx: ToolContext,
}

impl StopProcessTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for StopProcessTool {
    fn name(&self) -> &str {
        "stop_process"
    }

    fn description(&self) -> &str {
        "Stop a background process started by execute_code or run_shell_command."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "process_id": {
                    "type": "string",
                    "description": "The id of the process to stop"
                }
            },
            "required": ["process_id"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError> {
        let id = args.required_str("process_id")?;
        Ok(match self.ctx.processes.stop(id).await {
            StopOutcome::Stopped => ToolOutcome::success(format!("Process {id} has been stopped.")),
            StopOutcome::NotFound => {
                ToolOutcome::error(format!("No running process found with ID {id}."))
            }
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing;
    use std::time::Duration;

    fn args(value: serde_json::Value) -> ToolArgs {
        ToolArgs::new(value.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn execute_echo() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCodeTool::new(testing::context(dir.path()));
        let outcome = tool
            .execute(&args(serde_json::json!({"code": "echo hello"})))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("hello"));
        assert!(outcome.content.contains("Return Code: 0"));
    }

    #[tokio::test]
    async fn failing_command_is_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunShellCommandTool::new(testing::context(dir.path()));
        let outcome = tool
            .execute(&args(serde_json::json!({"command": "echo broken >&2; exit 2"})))
            .await
            .unwrap();
        assert!(outcome.is_error);
        assert!(outcome.content.contains("broken"));
        assert!(outcome.content.contains("Return Code: 2"));
    }

    #[tokio::test]
    async fn long_running_process_can_be_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = testing::context(dir.path());
        ctx.timeout = Duration::from_millis(200);

        let outcome = RunShellCommandTool::new(ctx.clone())
            .execute(&args(serde_json::json!({"command": "sleep 30"})))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("still running"));

        let stop = StopProcessTool::new(ctx.clone());
        let stopped = stop
            .execute(&args(serde_json::json!({"process_id": "1"})))
            .await
            .unwrap();
        assert!(!stopped.is_error);

        let again = stop
            .execute(&args(serde_json::json!({"process_id": "1"})))
            .await
            .unwrap();
        assert!(again.is_error);
        assert!(ctx.processes.running().await.is_empty());
    }
}
