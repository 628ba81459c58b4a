//! Git tools: status, diff, log, commit

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

use super::traits::{input_schema_for, parse_args, Tool, ToolResult};
use crate::Result;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_repo_path() -> String {
    ".".to_string()
}

/// Run a git command and return (merged output, exit code)
async fn run_git(args: &[&str], cwd: &str) -> (String, i32) {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(GIT_TIMEOUT, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return ("git not found on PATH".to_string(), 1)
        }
        Ok(Err(e)) => return (format!("git failed to start: {e}"), 1),
        Err(_) => return ("Git command timed out".to_string(), 1),
    };

    let mut merged = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if merged.is_empty() {
            merged = stderr.to_string();
        } else {
            merged.push('\n');
            merged.push_str(&stderr);
        }
    }
    (merged.trim().to_string(), output.status.code().unwrap_or(1))
}

/// Show the working tree status
pub struct GitStatusTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct GitStatusInput {
    /// Path to the git repository
    #[serde(default = "default_repo_path")]
    repo_path: String,
}

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show the git working tree status including staged, unstaged, and untracked files."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GitStatusInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: GitStatusInput = parse_args(args)?;
        let (output, code) = run_git(&["status", "--short"], &params.repo_path).await;
        if code != 0 {
            return Ok(ToolResult::failure(output));
        }
        Ok(ToolResult::success(if output.is_empty() {
            "(clean working tree)".to_string()
        } else {
            output
        }))
    }
}

/// Show changes in the working tree or against a ref
pub struct GitDiffTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct GitDiffInput {
    /// Path to the git repository
    #[serde(default = "default_repo_path")]
    repo_path: String,
    /// Show staged changes (--cached)
    #[serde(default)]
    staged: bool,
    /// Git ref to diff against (e.g. HEAD~1, main)
    #[serde(rename = "ref", default)]
    reference: String,
}

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show git diff for staged or unstaged changes, or between two refs."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GitDiffInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: GitDiffInput = parse_args(args)?;

        let mut cmd_args = vec!["diff"];
        if params.staged {
            cmd_args.push("--cached");
        }
        if !params.reference.is_empty() {
            cmd_args.push(&params.reference);
        }

        let (output, code) = run_git(&cmd_args, &params.repo_path).await;
        if code != 0 {
            return Ok(ToolResult::failure(output));
        }
        Ok(ToolResult::success(if output.is_empty() {
            "(no changes)".to_string()
        } else {
            output
        }))
    }
}

/// Show recent commit history
pub struct GitLogTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct GitLogInput {
    /// Path to the git repository
    #[serde(default = "default_repo_path")]
    repo_path: String,
    /// Number of commits to show
    #[serde(default = "default_log_count")]
    count: usize,
}

fn default_log_count() -> usize {
    10
}

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent git commit log with short hashes and messages."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GitLogInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: GitLogInput = parse_args(args)?;
        let count_arg = format!("-{}", params.count);
        let (output, code) = run_git(
            &["log", &count_arg, "--oneline", "--no-decorate"],
            &params.repo_path,
        )
        .await;
        if code != 0 {
            return Ok(ToolResult::failure(output));
        }
        Ok(ToolResult::success(if output.is_empty() {
            "(no commits)".to_string()
        } else {
            output
        }))
    }
}

/// Stage files and create a commit
pub struct GitCommitTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct GitCommitInput {
    /// Path to the git repository
    #[serde(default = "default_repo_path")]
    repo_path: String,
    /// File paths to stage
    files: Vec<String>,
    /// Commit message
    message: String,
}

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Stage specified files and create a git commit with the given message."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GitCommitInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: GitCommitInput = parse_args(args)?;

        for file in &params.files {
            let (output, code) = run_git(&["add", file], &params.repo_path).await;
            if code != 0 {
                return Ok(ToolResult::failure(format!(
                    "Failed to stage {file}: {output}"
                )));
            }
        }

        let (output, code) = run_git(&["commit", "-m", &params.message], &params.repo_path).await;
        if code != 0 {
            return Ok(ToolResult::failure(output));
        }
        Ok(ToolResult::success(output))
    }
}
