//! Sandboxed shell execution tool

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::traits::{input_schema_for, parse_args, Tool, ToolResult};
use crate::config::ToolsConfig;
use crate::Result;

/// Execute shell commands behind a command allowlist
pub struct ShellTool {
    config: ToolsConfig,
}

impl ShellTool {
    pub fn new(config: ToolsConfig) -> Self {
        ShellTool { config }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ShellInput {
    /// Shell command to execute
    command: String,
    /// Working directory for the command
    #[serde(default = "default_working_dir")]
    working_dir: String,
    /// Timeout in seconds (uses the configured default if not set)
    #[serde(default)]
    timeout: Option<u64>,
}

fn default_working_dir() -> String {
    ".".to_string()
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout/stderr. Commands are validated against an allowlist for safety."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<ShellInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: ShellInput = parse_args(args)?;

        // Allowlist check happens before any process is spawned
        if self.config.sandbox_enabled {
            let base_cmd = params.command.split_whitespace().next().unwrap_or("");
            if !self.config.allowed_commands.iter().any(|c| c == base_cmd) {
                return Ok(ToolResult::failure(format!(
                    "Command '{}' not in allowed list: {:?}",
                    base_cmd, self.config.allowed_commands
                )));
            }
        }

        let timeout = params
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.config.shell_timeout);

        debug!("Running shell command: {}", params.command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&params.working_dir)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(ToolResult::failure(format!("Execution failed: {e}"))),
            Err(_) => {
                return Ok(ToolResult::failure(format!(
                    "Command timed out after {}s",
                    timeout.as_secs()
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut parts = Vec::new();
        if !stdout.is_empty() {
            parts.push(stdout.to_string());
        }
        if !stderr.is_empty() {
            parts.push(format!("[stderr]\n{stderr}"));
        }
        let combined = if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        };

        let code = output.status.code().unwrap_or(-1);
        if code != 0 {
            return Ok(ToolResult::failure_with_output(
                combined,
                format!("Exit code {code}"),
            ));
        }
        Ok(ToolResult::success(combined))
    }
}
