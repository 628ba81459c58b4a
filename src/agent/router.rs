//! Complexity router - decides between the direct loop and plan-and-execute

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::config::PlannerConfig;

/// Keywords that suggest multi-step, complex tasks
const COMPLEX_KEYWORDS: &[&str] = &[
    "refactor",
    "migrate",
    "restructure",
    "redesign",
    "overhaul",
    "add feature",
    "implement",
    "build",
    "create new",
    "across files",
    "multiple files",
    "entire codebase",
    "test suite",
    "end to end",
    "integration",
    "optimize",
    "performance",
    "benchmark",
];

/// Keywords that suggest simple, single-step tasks
const SIMPLE_KEYWORDS: &[&str] = &[
    "fix typo",
    "rename",
    "add import",
    "remove unused",
    "update version",
    "change value",
    "read file",
    "what is",
    "explain",
    "show me",
    "find",
];

static FILE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w/]+\.\w{1,4}").expect("valid file reference regex"));

static STEP_CUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"then|after that|next|also|finally").expect("valid step cue regex"));

/// Task complexity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    Simple,
    Complex,
}

impl std::fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskComplexity::Simple => write!(f, "simple"),
            TaskComplexity::Complex => write!(f, "complex"),
        }
    }
}

/// Result of the complexity routing decision
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub complexity: TaskComplexity,
    pub confidence: f64,
    pub reason: String,
}

impl RoutingDecision {
    pub fn needs_planning(&self) -> bool {
        self.complexity == TaskComplexity::Complex
    }
}

/// Heuristic classifier over the raw task string.
///
/// Additive signal scoring around a 0.5 baseline, clamped to [0, 1]:
/// keyword matches, task length, file references, and multi-step cues.
/// Simple tasks go straight to the ReAct loop; complex tasks get decomposed
/// by the planner first.
pub struct ComplexityRouter {
    config: PlannerConfig,
}

impl ComplexityRouter {
    pub fn new(config: PlannerConfig) -> Self {
        ComplexityRouter { config }
    }

    /// Classify task complexity and decide execution strategy
    pub fn route(&self, task: &str) -> RoutingDecision {
        // A blank task has no signal to score
        if task.trim().is_empty() {
            return RoutingDecision {
                complexity: TaskComplexity::Simple,
                confidence: 0.0,
                reason: "Default classification".to_string(),
            };
        }

        let mut score: f64 = 0.0;
        let mut reasons: Vec<String> = Vec::new();
        let task_lower = task.to_lowercase();

        let complex_matches: Vec<&str> = COMPLEX_KEYWORDS
            .iter()
            .filter(|kw| task_lower.contains(*kw))
            .copied()
            .collect();
        if !complex_matches.is_empty() {
            score += 0.3 * complex_matches.len() as f64;
            reasons.push(format!("Complex keywords: {}", complex_matches.join(", ")));
        }

        let simple_matches: Vec<&str> = SIMPLE_KEYWORDS
            .iter()
            .filter(|kw| task_lower.contains(*kw))
            .copied()
            .collect();
        if !simple_matches.is_empty() {
            score -= 0.3 * simple_matches.len() as f64;
            reasons.push(format!("Simple keywords: {}", simple_matches.join(", ")));
        }

        let word_count = task.split_whitespace().count();
        if word_count > 50 {
            score += 0.2;
            reasons.push(format!("Long task description ({word_count} words)"));
        } else if word_count < 10 {
            score -= 0.2;
            reasons.push(format!("Short task description ({word_count} words)"));
        }

        let file_refs = FILE_REF_RE.find_iter(task).count();
        if file_refs >= 3 {
            score += 0.2;
            reasons.push(format!("Multiple file references ({file_refs})"));
        }

        let step_cues = STEP_CUE_RE.find_iter(&task_lower).count();
        if step_cues > 0 {
            score += 0.15 * step_cues as f64;
            reasons.push(format!("Multi-step indicators ({step_cues})"));
        }

        let score = (score + 0.5).clamp(0.0, 1.0);
        let complexity = if score >= self.config.complexity_threshold {
            TaskComplexity::Complex
        } else {
            TaskComplexity::Simple
        };

        let decision = RoutingDecision {
            complexity,
            confidence: (score - 0.5).abs() * 2.0,
            reason: if reasons.is_empty() {
                "Default classification".to_string()
            } else {
                reasons.join("; ")
            },
        };

        info!(
            "Routed task as {} (score={:.2}, confidence={:.2})",
            complexity, score, decision.confidence
        );
        decision
    }
}
