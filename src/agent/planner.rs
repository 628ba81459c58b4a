//! Plan-and-Execute decomposition for complex multi-step tasks

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::agent::prompts;
use crate::agent::Conversation;
use crate::agent::LlmClient;
use crate::config::PlannerConfig;
use crate::trace::{EventType, TraceRecorder};
use crate::Result;

/// Tokens budget for planning calls; a step list is short
const PLAN_MAX_TOKENS: u32 = 1024;

static STEP_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\d+)[.)]\s*(.+)$").expect("valid step line regex"));

/// Status of a plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    fn icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "[ ]",
            StepStatus::InProgress => "[>]",
            StepStatus::Completed => "[x]",
            StepStatus::Failed => "[!]",
            StepStatus::Skipped => "[-]",
        }
    }

    /// True once the step needs no further work
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// A single step in the execution plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    /// Display number parsed from the model's list; steps are addressed by
    /// insertion order, not by this value
    pub index: usize,
    pub description: String,
    pub status: StepStatus,
    pub result: String,
    pub error: String,
}

impl PlanStep {
    fn new(index: usize, description: String) -> Self {
        PlanStep {
            index,
            description,
            status: StepStatus::Pending,
            result: String::new(),
            error: String::new(),
        }
    }
}

/// A decomposed plan for executing a complex task
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub task: String,
    pub steps: Vec<PlanStep>,
    pub failure_count: u32,
}

impl ExecutionPlan {
    /// Insertion-order position of the next pending step
    pub fn current_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// The next pending step
    pub fn current_step(&self) -> Option<&PlanStep> {
        self.current_index().map(|i| &self.steps[i])
    }

    /// True once no step is pending or in progress
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// Human-readable progress summary
    pub fn progress_summary(&self) -> String {
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        let failed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count();
        format!(
            "Progress: {}/{} completed, {} failed",
            completed,
            self.steps.len(),
            failed
        )
    }

    /// Render the plan as context for the agent
    pub fn to_context_string(&self) -> String {
        let mut lines = vec![format!("Execution Plan for: {}", self.task), String::new()];
        for step in &self.steps {
            lines.push(format!(
                "{} {}. {}",
                step.status.icon(),
                step.index,
                step.description
            ));
            if !step.result.is_empty() {
                lines.push(format!("    Result: {}", truncate(&step.result, 100)));
            }
            if !step.error.is_empty() {
                lines.push(format!("    Error: {}", truncate(&step.error, 100)));
            }
        }
        lines.join("\n")
    }
}

/// Decomposes complex tasks into executable step sequences.
///
/// Prompts the LLM for a numbered step list and tracks execution progress,
/// with support for replanning after failures.
pub struct Planner {
    config: PlannerConfig,
    llm: Arc<LlmClient>,
    trace: Option<Arc<TraceRecorder>>,
}

impl Planner {
    pub fn new(config: PlannerConfig, llm: Arc<LlmClient>, trace: Option<Arc<TraceRecorder>>) -> Self {
        Planner { config, llm, trace }
    }

    /// Generate an execution plan for a complex task.
    ///
    /// An unparseable response yields an empty plan; the caller decides how
    /// to degrade.
    pub async fn create_plan(&self, task: &str, context: &str) -> Result<ExecutionPlan> {
        let prompt = prompts::planner_prompt(task, context, self.config.max_plan_steps)?;

        let mut conversation = Conversation::new(prompts::PLANNER_SYSTEM_PROMPT);
        conversation.add_user_message(prompt);

        let response = self
            .llm
            .chat(&conversation, None, None, Some(PLAN_MAX_TOKENS))
            .await?;

        let steps = parse_steps(&response.text());
        let plan = ExecutionPlan {
            task: task.to_string(),
            steps,
            failure_count: 0,
        };

        if let Some(trace) = &self.trace {
            trace.record(
                EventType::PlanStep,
                json!({
                    "action": "created",
                    "task": task,
                    "step_count": plan.steps.len(),
                    "steps": plan.steps.iter().map(|s| s.description.clone()).collect::<Vec<_>>(),
                }),
            );
        }

        info!(
            "Created plan with {} steps for: {}",
            plan.steps.len(),
            truncate(task, 80)
        );
        Ok(plan)
    }

    /// Generate a new plan after failures, seeded with what succeeded and
    /// what failed in the previous attempt
    pub async fn replan(&self, plan: &ExecutionPlan, context: &str) -> Result<ExecutionPlan> {
        let mut attempt_context = vec![context.to_string(), String::new(), "Previous attempt results:".to_string()];
        for step in &plan.steps {
            match step.status {
                StepStatus::Completed => {
                    attempt_context.push(format!("  Completed: {}", step.description));
                }
                StepStatus::Failed => {
                    attempt_context.push(format!("  Failed: {} — {}", step.description, step.error));
                }
                _ => {}
            }
        }

        let mut new_plan = self.create_plan(&plan.task, &attempt_context.join("\n")).await?;
        new_plan.failure_count = plan.failure_count + 1;

        if let Some(trace) = &self.trace {
            trace.record(
                EventType::PlanStep,
                json!({
                    "action": "replanned",
                    "attempt": new_plan.failure_count,
                    "new_step_count": new_plan.steps.len(),
                }),
            );
        }

        Ok(new_plan)
    }
}

/// Parse numbered steps from model output. Lines without the pattern are
/// ignored; both `1.` and `1)` separators are accepted.
fn parse_steps(text: &str) -> Vec<PlanStep> {
    STEP_LINE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let index: usize = caps.get(1)?.as_str().parse().ok()?;
            let description = caps.get(2)?.as_str().trim().to_string();
            if description.is_empty() {
                None
            } else {
                Some(PlanStep::new(index, description))
            }
        })
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
