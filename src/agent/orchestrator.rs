//! Task orchestrator - routing, planning, and verification around the loop
//!
//! Simple tasks go straight to the ReAct loop. Complex tasks are decomposed
//! into a plan whose steps run as sub-tasks with the rendered plan as
//! context; consecutive step failures trigger one replan, and needing a
//! second one fails the task. Runs that modified files pass through the
//! verification pipeline.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::agent::agent_loop::AgentLoop;
use crate::agent::planner::{Planner, StepStatus};
use crate::agent::router::ComplexityRouter;
use crate::agent::types::AgentResult;
use crate::agent::LlmClient;
use crate::cache::TaskCache;
use crate::config::Settings;
use crate::cost::CostAccountant;
use crate::critic::Verifier;
use crate::tools::ToolRegistry;
use crate::trace::TraceRecorder;

/// Wires the router, planner, verifier, and agent loop into one entry point
pub struct Orchestrator {
    settings: Settings,
    router: ComplexityRouter,
    planner: Planner,
    verifier: Verifier,
    agent: AgentLoop,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        llm: Arc<LlmClient>,
        tools: Arc<ToolRegistry>,
        cost: Arc<CostAccountant>,
        trace: Option<Arc<TraceRecorder>>,
        cache: Option<Arc<TaskCache>>,
    ) -> Self {
        let router = ComplexityRouter::new(settings.planner.clone());
        let planner = Planner::new(settings.planner.clone(), llm.clone(), trace.clone());
        let verifier = Verifier::new(settings.critic.clone(), trace.clone());
        let mut agent = AgentLoop::new(settings.clone(), llm, tools, cost, trace);
        if let Some(cache) = cache {
            agent = agent.with_cache(cache);
        }
        Orchestrator {
            settings,
            router,
            planner,
            verifier,
            agent,
        }
    }

    /// The underlying loop, for callers that want direct access
    pub fn agent_mut(&mut self) -> &mut AgentLoop {
        &mut self.agent
    }

    /// Execute a task, routed by complexity
    pub async fn run(&mut self, task: &str, context: &str) -> AgentResult {
        let decision = self.router.route(task);
        info!(
            "Routing decision: {} (confidence {:.2}) — {}",
            decision.complexity, decision.confidence, decision.reason
        );

        let mut result = if decision.needs_planning() {
            self.run_planned(task, context).await
        } else {
            self.agent.run(task, context).await
        };

        // Verify what the run touched, unless every phase is disabled
        let critic = &self.settings.critic;
        let any_check = critic.ast_check || critic.run_lint || critic.run_tests;
        if any_check && !result.files_modified.is_empty() {
            let verification = self
                .verifier
                .verify(&result.files_modified, &critic.test_path)
                .await;
            if !verification.passed() {
                result.success = false;
            }
            result
                .response
                .push_str(&format!("\n\nVerification:\n{}", verification.summary()));
        }

        result
    }

    /// Plan-and-execute path for complex tasks
    async fn run_planned(&mut self, task: &str, context: &str) -> AgentResult {
        let start = Instant::now();

        let mut plan = match self.planner.create_plan(task, context).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Planning failed: {}", e);
                return AgentResult {
                    success: false,
                    response: format!("Agent encountered an error: {e}"),
                    duration_seconds: start.elapsed().as_secs_f64(),
                    ..AgentResult::default()
                };
            }
        };

        // Nothing parseable came back; run the task directly instead
        if plan.steps.is_empty() {
            warn!("Planner produced no steps, falling back to direct execution");
            return self.agent.run(task, context).await;
        }

        let mut iterations = 0;
        let mut tool_calls_made: Vec<String> = Vec::new();
        let mut files_modified: Vec<String> = Vec::new();
        let mut last_response = String::new();
        let mut consecutive_failures: u32 = 0;
        let mut replanned = false;
        let mut aborted: Option<String> = None;

        while let Some(idx) = plan.current_index() {
            plan.steps[idx].status = StepStatus::InProgress;
            let description = plan.steps[idx].description.clone();
            info!("Executing plan step {}: {}", plan.steps[idx].index, description);

            let sub = self.agent.run(&description, &plan.to_context_string()).await;

            iterations += sub.iterations;
            tool_calls_made.extend(sub.tool_calls_made);
            for file in sub.files_modified {
                if !files_modified.contains(&file) {
                    files_modified.push(file);
                }
            }
            last_response = sub.response.clone();

            if sub.success {
                plan.steps[idx].status = StepStatus::Completed;
                plan.steps[idx].result = truncate(&sub.response, 200);
                consecutive_failures = 0;
                continue;
            }

            plan.steps[idx].status = StepStatus::Failed;
            plan.steps[idx].error = truncate(&sub.response, 200);
            consecutive_failures += 1;

            if consecutive_failures < self.settings.planner.replan_after_failures {
                continue;
            }

            // One replan is allowed; needing a second ends the task
            if replanned {
                aborted = Some(format!(
                    "Task failed: steps kept failing after replanning ({})",
                    plan.progress_summary()
                ));
                break;
            }
            match self.planner.replan(&plan, context).await {
                Ok(new_plan) => {
                    plan = new_plan;
                    replanned = true;
                    consecutive_failures = 0;
                }
                Err(e) => {
                    warn!("Replanning failed: {}", e);
                    aborted = Some(format!("Task failed: replanning failed ({e})"));
                    break;
                }
            }
        }

        let failed_steps = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count();
        let success = aborted.is_none() && plan.is_complete() && failed_steps == 0;

        let response = match aborted {
            Some(message) => message,
            None => format!("{}\n\n{}", plan.progress_summary(), last_response),
        };

        let summary = self.agent.cost_summary();
        AgentResult {
            success,
            response,
            iterations,
            tool_calls_made,
            files_modified,
            total_tokens: summary.total_tokens,
            total_cost_usd: summary.total_cost_usd,
            duration_seconds: (start.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CriticConfig, LlmConfig};
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "claude-sonnet-4-20250514";

    fn settings_for(server_uri: &str) -> Settings {
        Settings {
            llm: LlmConfig {
                base_url: server_uri.to_string(),
                ..LlmConfig::default()
            },
            critic: CriticConfig {
                ast_check: false,
                run_lint: false,
                run_tests: false,
                ..CriticConfig::default()
            },
            ..Settings::default()
        }
    }

    fn build(settings: Settings) -> Orchestrator {
        let cost = Arc::new(CostAccountant::new(settings.cost.clone(), None));
        let llm = Arc::new(
            LlmClient::new(
                settings.llm.clone(),
                SecretString::from("test-key"),
                cost.clone(),
                None,
            )
            .unwrap(),
        );
        let tools = Arc::new(ToolRegistry::new(None));
        Orchestrator::new(settings, llm, tools, cost, None, None)
    }

    fn text_body(text: &str) -> serde_json::Value {
        json!({
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "model": MODEL,
            "usage": {"input_tokens": 10, "output_tokens": 5},
        })
    }

    #[tokio::test]
    async fn test_simple_task_skips_planner() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("four")))
            .expect(1)
            .mount(&server)
            .await;

        let mut orchestrator = build(settings_for(&server.uri()));
        let result = orchestrator.run("what is 2+2?", "").await;

        assert!(result.success);
        assert_eq!(result.response, "four");
        // Exactly one LLM round trip: no planning call happened
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complex_task_runs_plan_steps() {
        let server = MockServer::start().await;

        // Planning call is recognisable by the planner prompt
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_string_contains("task planner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body(
                "1. Inspect the auth module\n2. Apply the refactor",
            )))
            .expect(1)
            .mount(&server)
            .await;
        // Every step run ends immediately
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("step done")))
            .mount(&server)
            .await;

        let mut orchestrator = build(settings_for(&server.uri()));
        let result = orchestrator
            .run(
                "refactor the authentication module across multiple files, then update tests",
                "",
            )
            .await;

        assert!(result.success, "unexpected failure: {}", result.response);
        assert!(result.response.contains("Progress: 2/2 completed, 0 failed"));
        // One planning call + two step runs
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unparseable_plan_falls_back_to_direct_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("task planner"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_body("No list for you.")),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("did it directly")))
            .mount(&server)
            .await;

        let mut orchestrator = build(settings_for(&server.uri()));
        let result = orchestrator
            .run("refactor everything across multiple files, then run the test suite", "")
            .await;

        assert!(result.success);
        assert_eq!(result.response, "did it directly");
    }

    #[tokio::test]
    async fn test_replanning_once_then_failing_terminates() {
        let server = MockServer::start().await;
        // Both the initial plan and the replan produce one step
        Mock::given(method("POST"))
            .and(body_string_contains("task planner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("1. do the thing")))
            .mount(&server)
            .await;
        // Step runs always report an error, so every step fails
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_body("error: cannot complete this step")),
            )
            .mount(&server)
            .await;

        let mut settings = settings_for(&server.uri());
        settings.planner.replan_after_failures = 1;
        let mut orchestrator = build(settings);
        let result = orchestrator
            .run("refactor the entire codebase, then benchmark performance", "")
            .await;

        assert!(!result.success);
        assert!(result.response.contains("after replanning"));
    }
}
