//! LLM-based code evaluator with structured rubric scoring

use std::sync::Arc;
use tracing::warn;

use crate::agent::prompts;
use crate::agent::Conversation;
use crate::agent::LlmClient;
use crate::config::CriticConfig;
use crate::Result;

/// Model used for evaluation calls; rubric scoring doesn't need the big model
const EVALUATOR_MODEL: &str = "claude-haiku-4-5-20251001";

const DIMENSIONS: &[&str] = &["correctness", "style", "edge_cases", "simplicity"];

/// Score for a single evaluation dimension
#[derive(Debug, Clone)]
pub struct DimensionScore {
    pub name: String,
    pub score: u8,
    pub reasoning: String,
}

/// Full evaluation result from the LLM critic
#[derive(Debug, Clone, Default)]
pub struct EvaluationResult {
    pub scores: Vec<DimensionScore>,
    pub verdict: String,
    pub suggestions: Vec<String>,
    pub raw_response: String,
}

impl EvaluationResult {
    pub fn passed(&self) -> bool {
        self.verdict == "pass"
    }

    /// Average score across all dimensions
    pub fn average_score(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().map(|s| s.score as f64).sum::<f64>() / self.scores.len() as f64
    }

    /// Human-readable evaluation summary
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Verdict: {} (avg: {:.1}/5)",
            self.verdict.to_uppercase(),
            self.average_score()
        )];
        for score in &self.scores {
            lines.push(format!(
                "  {}: {}/5 — {}",
                score.name, score.score, score.reasoning
            ));
        }
        if !self.suggestions.is_empty() {
            lines.push("Suggestions:".to_string());
            for s in &self.suggestions {
                lines.push(format!("  - {s}"));
            }
        }
        lines.join("\n")
    }
}

/// Rubric-based LLM evaluation of generated code.
///
/// Sends the code and task to a cheap model and parses a structured
/// pass/fail verdict with per-dimension scores. A parse failure degrades to
/// a pass rather than blocking the task.
pub struct Evaluator {
    config: CriticConfig,
    llm: Arc<LlmClient>,
}

impl Evaluator {
    pub fn new(config: CriticConfig, llm: Arc<LlmClient>) -> Self {
        Evaluator { config, llm }
    }

    /// Evaluate code changes against the task requirements
    pub async fn evaluate(&self, code: &str, task: &str) -> Result<EvaluationResult> {
        if !self.config.rubric_enabled {
            return Ok(EvaluationResult {
                verdict: "pass".to_string(),
                ..EvaluationResult::default()
            });
        }

        let truncated: String = code.chars().take(3000).collect();
        let prompt = prompts::evaluator_prompt(&truncated, task)?;

        let mut conversation = Conversation::new(prompts::EVALUATOR_SYSTEM_PROMPT);
        conversation.add_user_message(prompt);

        let response = self
            .llm
            .chat(&conversation, None, Some(EVALUATOR_MODEL), Some(512))
            .await?;

        Ok(parse_evaluation(&response.text()))
    }
}

/// Parse the model's JSON evaluation, tolerating markdown fences
fn parse_evaluation(text: &str) -> EvaluationResult {
    let mut result = EvaluationResult {
        raw_response: text.to_string(),
        ..EvaluationResult::default()
    };

    let json_text = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => "",
    };

    match serde_json::from_str::<serde_json::Value>(json_text) {
        Ok(data) => {
            for dimension in DIMENSIONS {
                if let Some(dim) = data.get(dimension) {
                    let score = dim.get("score").and_then(|s| s.as_i64()).unwrap_or(3);
                    result.scores.push(DimensionScore {
                        name: dimension.to_string(),
                        score: score.clamp(1, 5) as u8,
                        reasoning: dim
                            .get("reasoning")
                            .and_then(|r| r.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
            result.verdict = data
                .get("overall_verdict")
                .and_then(|v| v.as_str())
                .unwrap_or("fail")
                .to_string();
            result.suggestions = data
                .get("suggestions")
                .and_then(|s| s.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
        }
        Err(e) => {
            warn!("Failed to parse evaluation response: {}", e);
            // Don't block the task on an unparseable review
            result.verdict = "pass".to_string();
            result.suggestions =
                vec!["Evaluation parsing failed — manual review recommended".to_string()];
        }
    }

    result
}
