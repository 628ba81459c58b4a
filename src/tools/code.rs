//! Code tools: syntax validation, lint, and test execution
//!
//! All three shell out to the Python toolchain the agent operates on and
//! carry explicit timeouts.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

use super::traits::{input_schema_for, parse_args, Tool, ToolResult};
use crate::Result;

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const TEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Locate the python interpreter, preferring python3
fn find_python() -> Option<PathBuf> {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .ok()
}

/// Run a program and return (merged output, exit code)
async fn run_checked(
    program: &std::path::Path,
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<(String, i32), String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("Failed to start {}: {e}", program.display())),
        Err(_) => return Err(format!("Timed out after {}s", timeout.as_secs())),
    };

    let mut merged = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if merged.is_empty() {
            merged = stderr.to_string();
        } else {
            merged.push('\n');
            merged.push_str(stderr);
        }
    }
    Ok((merged, output.status.code().unwrap_or(1)))
}

/// Validate Python syntax by byte-compiling the file
pub struct AstCheckTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct AstCheckInput {
    /// Path to the Python file to check
    path: String,
}

#[async_trait]
impl Tool for AstCheckTool {
    fn name(&self) -> &str {
        "ast_check"
    }

    fn description(&self) -> &str {
        "Check if a Python file has valid syntax by parsing it. Returns syntax errors if any."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<AstCheckInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: AstCheckInput = parse_args(args)?;
        let path = PathBuf::from(&params.path);

        if !path.exists() {
            return Ok(ToolResult::failure(format!(
                "File not found: {}",
                path.display()
            )));
        }
        let Some(python) = find_python() else {
            return Ok(ToolResult::failure("python not found on PATH"));
        };

        match run_checked(&python, &["-m", "py_compile", &params.path], CHECK_TIMEOUT).await {
            Ok((_, 0)) => Ok(ToolResult::success(format!("Syntax OK: {}", path.display()))),
            Ok((output, _)) => Ok(ToolResult::failure_with_output(output, "Syntax error")),
            Err(e) => Ok(ToolResult::failure(e)),
        }
    }
}

/// Run the ruff linter on a file or directory
pub struct LintTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct LintInput {
    /// File or directory to lint
    path: String,
    /// Auto-fix issues where possible
    #[serde(default)]
    fix: bool,
}

#[async_trait]
impl Tool for LintTool {
    fn name(&self) -> &str {
        "lint"
    }

    fn description(&self) -> &str {
        "Run the ruff linter on a file or directory to check for code quality issues."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<LintInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: LintInput = parse_args(args)?;

        let Ok(ruff) = which::which("ruff") else {
            return Ok(ToolResult::failure("ruff not found on PATH"));
        };

        let mut cmd_args = vec!["check", params.path.as_str()];
        if params.fix {
            cmd_args.push("--fix");
        }

        match run_checked(&ruff, &cmd_args, CHECK_TIMEOUT).await {
            Ok((output, 0)) => Ok(ToolResult::success(if output.is_empty() {
                "All checks passed".to_string()
            } else {
                output
            })),
            Ok((output, _)) => Ok(ToolResult::failure_with_output(output, "Lint issues found")),
            Err(e) => Ok(ToolResult::failure(e)),
        }
    }
}

/// Run pytest on files or directories
pub struct TestRunnerTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct TestRunnerInput {
    /// File or directory to test
    #[serde(default = "default_test_path")]
    path: String,
    /// Show verbose output
    #[serde(default = "default_true")]
    verbose: bool,
    /// Specific test name filter (e.g. test_foo)
    #[serde(default)]
    specific_test: String,
}

fn default_test_path() -> String {
    "tests/".to_string()
}

fn default_true() -> bool {
    true
}

#[async_trait]
impl Tool for TestRunnerTool {
    fn name(&self) -> &str {
        "run_tests"
    }

    fn description(&self) -> &str {
        "Run pytest on a file or directory and return the results."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<TestRunnerInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: TestRunnerInput = parse_args(args)?;

        let Some(python) = find_python() else {
            return Ok(ToolResult::failure("python not found on PATH"));
        };

        let mut cmd_args = vec!["-m", "pytest", params.path.as_str()];
        if params.verbose {
            cmd_args.push("-v");
        }
        cmd_args.extend(["--tb", "short"]);
        if !params.specific_test.is_empty() {
            cmd_args.extend(["-k", params.specific_test.as_str()]);
        }

        match run_checked(&python, &cmd_args, TEST_TIMEOUT).await {
            Ok((output, 0)) => Ok(ToolResult::success(output)),
            Ok((output, _)) => Ok(ToolResult::failure_with_output(output, "Tests failed")),
            Err(e) => Ok(ToolResult::failure(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ast_check_valid_file() {
        if find_python().is_none() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.py");
        tokio::fs::write(&path, "def greet(name):\n    return f'hi {name}'\n")
            .await
            .unwrap();

        let result = AstCheckTool.execute(json!({"path": path})).await.unwrap();
        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert!(result.output.starts_with("Syntax OK"));
    }

    #[tokio::test]
    async fn test_ast_check_syntax_error() {
        if find_python().is_none() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.py");
        tokio::fs::write(&path, "def broken(:\n    pass\n")
            .await
            .unwrap();

        let result = AstCheckTool.execute(json!({"path": path})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_ast_check_missing_file() {
        let result = AstCheckTool
            .execute(json!({"path": "/no/such/file.py"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn test_lint_missing_path_argument_is_trapped() {
        let result = LintTool.safe_execute(json!({})).await;
        assert!(!result.success);
    }

    #[test]
    fn test_schemas_expose_defaults() {
        let schema = TestRunnerTool.input_schema();
        let required = schema
            .get("required")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        // Everything defaults, nothing is required
        assert!(required.is_empty());
        assert!(schema["properties"]["specific_test"].is_object());
    }
}
