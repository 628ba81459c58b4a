//! Automated code verifier - syntax, lint, and test pipeline

use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::config::CriticConfig;
use crate::tools::{AstCheckTool, LintTool, TestRunnerTool, Tool};
use crate::trace::{EventType, TraceRecorder};

/// Status of a verification check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

impl CheckStatus {
    fn icon(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "OK",
            CheckStatus::Failed => "FAIL",
            CheckStatus::Skipped => "SKIP",
        }
    }
}

/// Result of a single verification check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub details: String,
}

impl CheckResult {
    fn skipped(name: &str) -> Self {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Skipped,
            message: "Disabled".to_string(),
            details: String::new(),
        }
    }
}

/// Aggregated result of the full verification pipeline
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationResult {
    pub checks: Vec<CheckResult>,
}

impl VerificationResult {
    /// True if every non-skipped check passed
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Failed)
    }

    /// Failed checks only
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Failed)
            .collect()
    }

    /// Human-readable summary, one line per check
    pub fn summary(&self) -> String {
        self.checks
            .iter()
            .map(|c| format!("  [{}] {}: {}", c.status.icon(), c.name, c.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sequential verification pipeline over modified files.
///
/// Order is fixed: syntax check per file (fail fast), then lint per file,
/// then the test suite. Each phase can be disabled independently, which
/// yields a single skipped placeholder for that phase.
pub struct Verifier {
    config: CriticConfig,
    trace: Option<Arc<TraceRecorder>>,
    ast_tool: AstCheckTool,
    lint_tool: LintTool,
    test_tool: TestRunnerTool,
}

impl Verifier {
    pub fn new(config: CriticConfig, trace: Option<Arc<TraceRecorder>>) -> Self {
        Verifier {
            config,
            trace,
            ast_tool: AstCheckTool,
            lint_tool: LintTool,
            test_tool: TestRunnerTool,
        }
    }

    /// Run the pipeline over modified files, testing against `test_path`
    pub async fn verify(&self, files: &[String], test_path: &str) -> VerificationResult {
        let mut result = VerificationResult::default();
        let py_files: Vec<&String> = files.iter().filter(|f| f.ends_with(".py")).collect();

        // 1. Syntax check, fail fast
        if self.config.ast_check {
            for file in &py_files {
                let check = self.run_ast_check(file).await;
                let failed = check.status == CheckStatus::Failed;
                if failed {
                    self.record_failed(&check);
                }
                result.checks.push(check);
                if failed {
                    self.record_summary(&result);
                    return result;
                }
            }
        } else {
            result.checks.push(CheckResult::skipped("ast_check"));
        }

        // 2. Lint
        if self.config.run_lint {
            for file in &py_files {
                let check = self.run_lint_check(file).await;
                if check.status == CheckStatus::Failed {
                    self.record_failed(&check);
                }
                result.checks.push(check);
            }
        } else {
            result.checks.push(CheckResult::skipped("lint"));
        }

        // 3. Tests
        if self.config.run_tests {
            let check = self.run_tests(test_path).await;
            if check.status == CheckStatus::Failed {
                self.record_failed(&check);
            }
            result.checks.push(check);
        } else {
            result.checks.push(CheckResult::skipped("tests"));
        }

        self.record_summary(&result);
        result
    }

    async fn run_ast_check(&self, file: &str) -> CheckResult {
        let tool_result = self.ast_tool.safe_execute(json!({"path": file})).await;
        let name = format!("ast_check:{}", file_name(file));
        if tool_result.success {
            CheckResult {
                name,
                status: CheckStatus::Passed,
                message: "Syntax OK".to_string(),
                details: String::new(),
            }
        } else {
            CheckResult {
                name,
                status: CheckStatus::Failed,
                message: "Syntax error".to_string(),
                details: if tool_result.output.is_empty() {
                    tool_result.error.unwrap_or_default()
                } else {
                    tool_result.output
                },
            }
        }
    }

    async fn run_lint_check(&self, file: &str) -> CheckResult {
        let tool_result = self.lint_tool.safe_execute(json!({"path": file})).await;
        let name = format!("lint:{}", file_name(file));
        if tool_result.success {
            CheckResult {
                name,
                status: CheckStatus::Passed,
                message: "No lint issues".to_string(),
                details: String::new(),
            }
        } else {
            CheckResult {
                name,
                status: CheckStatus::Failed,
                message: "Lint issues found".to_string(),
                details: tool_result.output,
            }
        }
    }

    async fn run_tests(&self, test_path: &str) -> CheckResult {
        let tool_result = self.test_tool.safe_execute(json!({"path": test_path})).await;
        if tool_result.success {
            CheckResult {
                name: "tests".to_string(),
                status: CheckStatus::Passed,
                message: "All tests passed".to_string(),
                details: tool_result.output,
            }
        } else {
            CheckResult {
                name: "tests".to_string(),
                status: CheckStatus::Failed,
                message: "Tests failed".to_string(),
                details: tool_result.output,
            }
        }
    }

    fn record_failed(&self, check: &CheckResult) {
        if let Some(trace) = &self.trace {
            trace.record(
                EventType::CriticCheck,
                json!({
                    "check": check.name,
                    "status": check.status,
                    "message": check.message,
                }),
            );
        }
    }

    fn record_summary(&self, result: &VerificationResult) {
        if let Some(trace) = &self.trace {
            trace.record(
                EventType::CriticCheck,
                json!({
                    "summary": result.summary(),
                    "passed": result.passed(),
                    "total_checks": result.checks.len(),
                    "failed_checks": result.errors().len(),
                }),
            );
        }
    }
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
