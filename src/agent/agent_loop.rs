//! Core ReAct agent loop - observe, think, act, observe
//!
//! Drives the LLM through iterative tool use: send the conversation with
//! tool definitions, execute any requested tools, feed results back, and
//! repeat until the model stops asking for tools or a limit is hit. Cost
//! enforcement, tracing, and working-memory updates cut across every
//! iteration.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::agent::prompts;
use crate::agent::types::{AgentResult, ContentBlock};
use crate::agent::Conversation;
use crate::agent::LlmClient;
use crate::cache::{TaskCache, ToolCallSpec};
use crate::config::Settings;
use crate::cost::CostAccountant;
use crate::memory::WorkingMemory;
use crate::tools::ToolRegistry;
use crate::trace::{EventType, SpanId, TraceRecorder};
use crate::Error;

/// Hook for callers to surface loop progress (spinner text, logs, etc.)
#[async_trait]
pub trait StatusCallback: Send + Sync {
    async fn on_status(&self, _message: &str) {}
}

/// Default no-op callback
pub struct NoOpCallback;

#[async_trait]
impl StatusCallback for NoOpCallback {}

/// The ReAct orchestrator for a single task at a time.
///
/// Owns the conversation and working memory; shares the gateway, registry,
/// accountant, trace recorder, and cache with the rest of the runtime.
pub struct AgentLoop {
    settings: Settings,
    llm: Arc<LlmClient>,
    tools: Arc<ToolRegistry>,
    cost: Arc<CostAccountant>,
    trace: Option<Arc<TraceRecorder>>,
    cache: Option<Arc<TaskCache>>,
    memory: WorkingMemory,
    callback: Arc<dyn StatusCallback>,
}

impl AgentLoop {
    pub fn new(
        settings: Settings,
        llm: Arc<LlmClient>,
        tools: Arc<ToolRegistry>,
        cost: Arc<CostAccountant>,
        trace: Option<Arc<TraceRecorder>>,
    ) -> Self {
        let memory = WorkingMemory::new(settings.memory.max_working_items);
        AgentLoop {
            settings,
            llm,
            tools,
            cost,
            trace,
            cache: None,
            memory,
            callback: Arc::new(NoOpCallback),
        }
    }

    /// Attach the process-wide task cache
    pub fn with_cache(mut self, cache: Arc<TaskCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a status callback
    pub fn set_callback(&mut self, callback: Arc<dyn StatusCallback>) {
        self.callback = callback;
    }

    /// The task's working memory (useful for inspection after a run)
    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    /// Current aggregate of the shared cost accountant
    pub fn cost_summary(&self) -> crate::cost::CostSummary {
        self.cost.summary()
    }

    /// Execute a task through the ReAct loop.
    ///
    /// Always returns an [`AgentResult`]; budget exhaustion, provider errors,
    /// and the iteration cap are folded into the result rather than escaping.
    pub async fn run(&mut self, task: &str, context: &str) -> AgentResult {
        let start = Instant::now();
        let cost_start = self.cost.total_cost();
        let mut tool_calls_made: Vec<String> = Vec::new();
        let mut files_modified: Vec<String> = Vec::new();
        let mut tool_chain: Vec<ToolCallSpec> = Vec::new();

        // Probe the chain cache; a hit is recorded and its cost credited as
        // savings, then the loop still runs.
        if let Some(cache) = &self.cache {
            match cache.lookup(task).await {
                Ok(Some(chain)) => {
                    self.cost.credit_savings(chain.cost_usd);
                    self.callback
                        .on_status(&format!(
                            "Seen a similar task before ({} tool calls, ${:.4})",
                            chain.tool_chain.len(),
                            chain.cost_usd
                        ))
                        .await;
                }
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed: {}", e),
            }
        }

        let system = match prompts::system_prompt(&self.memory.to_context_string(), context) {
            Ok(system) => system,
            Err(e) => {
                self.record(EventType::Error, json!({"error": e.to_string()}));
                return self.build_result(
                    format!("Agent encountered an error: {e}"),
                    0,
                    tool_calls_made,
                    files_modified,
                    start,
                );
            }
        };

        let mut conversation = Conversation::new(system);
        conversation.add_user_message(task);

        let tool_defs = self.tools.definitions();
        let max_iterations = self.settings.llm.max_tool_iterations;

        let mut final_response = String::new();
        let mut iterations_used: u32 = 0;
        let mut finished = false;

        for iteration in 0..max_iterations {
            iterations_used = iteration + 1;
            let span = self.start_span(&format!("iteration_{iteration}"));

            self.callback
                .on_status(&format!("Thinking... (iteration {})", iteration + 1))
                .await;

            let response = match self
                .llm
                .chat(&conversation, Some(tool_defs.as_slice()), None, None)
                .await
            {
                Ok(response) => response,
                Err(Error::BudgetExceeded { spent, budget }) => {
                    warn!("Budget exceeded: ${:.4} of ${:.4}", spent, budget);
                    self.record(
                        EventType::BudgetWarning,
                        json!({"error": format!("${spent:.4} spent of ${budget:.4} limit")}),
                    );
                    final_response =
                        format!("Task stopped: budget exceeded (${spent:.4} of ${budget:.4})");
                    finished = true;
                    self.end_span(span);
                    break;
                }
                Err(e) => {
                    error!("Agent loop error at iteration {}: {}", iteration, e);
                    self.record(EventType::Error, json!({"error": e.to_string()}));
                    final_response = format!("Agent encountered an error: {e}");
                    finished = true;
                    self.end_span(span);
                    break;
                }
            };

            conversation.add_assistant_message(response.content.clone());

            let thought = response.text();
            if !thought.is_empty() {
                self.record(EventType::Thought, json!({"text": truncate(&thought, 500)}));
            }

            // No tool calls means the model is done
            if !response.has_tool_calls() {
                final_response = thought;
                finished = true;
                self.end_span(span);
                break;
            }

            let mut results: Vec<ContentBlock> = Vec::new();
            for block in response.tool_calls() {
                let ContentBlock::ToolUse { id, name, input } = block else {
                    continue;
                };
                tool_calls_made.push(name.clone());
                tool_chain.push(ToolCallSpec {
                    name: name.clone(),
                    input: input.clone(),
                });

                self.callback.on_status(&describe_tool_call(name, input)).await;

                let result = self.tools.execute(name, input.clone()).await;

                // write_file successes feed files_modified
                if name == "write_file" && result.success {
                    if let Some(path) = input.get("path").and_then(|p| p.as_str()) {
                        if !path.is_empty() && !files_modified.iter().any(|f| f == path) {
                            files_modified.push(path.to_string());
                        }
                    }
                }

                // Keep the freshest observation per tool in working memory,
                // preferring the error text over empty output
                let observation = if result.output.is_empty() {
                    truncate(&result.error.clone().unwrap_or_default(), 200)
                } else {
                    truncate(&result.output, 200)
                };
                self.record(
                    EventType::MemoryStore,
                    json!({"key": format!("last_{name}"), "chars": observation.len()}),
                );
                self.memory.set(format!("last_{name}"), observation);

                let succeeded = result.success;
                let content = if succeeded {
                    result.output
                } else {
                    format!(
                        "Error: {}\n{}",
                        result.error.unwrap_or_default(),
                        result.output
                    )
                };
                results.push(ContentBlock::tool_result(id.clone(), content, !succeeded));
            }

            conversation.add_tool_results(results);
            self.end_span(span);
        }

        if !finished {
            final_response = format!("Task stopped after {max_iterations} iterations (max reached)");
        }

        let result = self.build_result(
            final_response,
            iterations_used,
            tool_calls_made,
            files_modified,
            start,
        );

        // A successful run that touched files is worth remembering
        if result.success && !result.files_modified.is_empty() {
            if let Some(cache) = &self.cache {
                let spent = self.cost.total_cost() - cost_start;
                if let Err(e) = cache
                    .store(task, &tool_chain, &result.files_modified, spent)
                    .await
                {
                    warn!("Cache store failed: {}", e);
                }
            }
        }

        info!(
            "Task finished: success={}, iterations={}, tool_calls={}, cost=${:.4}",
            result.success,
            result.iterations,
            result.tool_calls_made.len(),
            result.total_cost_usd
        );
        result
    }

    fn build_result(
        &self,
        response: String,
        iterations: u32,
        tool_calls_made: Vec<String>,
        files_modified: Vec<String>,
        start: Instant,
    ) -> AgentResult {
        let summary = self.cost.summary();
        AgentResult {
            success: is_success(&response),
            response,
            iterations,
            tool_calls_made,
            files_modified,
            total_tokens: summary.total_tokens,
            total_cost_usd: summary.total_cost_usd,
            duration_seconds: (start.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        }
    }

    fn start_span(&self, name: &str) -> Option<SpanId> {
        self.trace.as_ref().map(|t| t.start_span(name, None))
    }

    fn end_span(&self, span: Option<SpanId>) {
        if let (Some(trace), Some(span)) = (&self.trace, span) {
            trace.end_span(Some(&span));
        }
    }

    fn record(&self, event_type: EventType, data: Value) {
        if let Some(trace) = &self.trace {
            trace.record(event_type, data);
        }
    }
}

/// A response is successful when it is non-empty, mentions no error, and is
/// not one of the "Task stopped" sentinels.
fn is_success(response: &str) -> bool {
    !response.is_empty()
        && !response.to_lowercase().contains("error")
        && !response.starts_with("Task stopped")
}

/// Human-readable one-liner for a tool invocation
fn describe_tool_call(name: &str, input: &Value) -> String {
    let detail = match name {
        "read_file" | "write_file" => input
            .get("path")
            .and_then(|v| v.as_str())
            .map(|p| format!(" → {p}")),
        "grep" => input
            .get("pattern")
            .and_then(|v| v.as_str())
            .map(|p| format!(" → '{p}'")),
        "shell" => input
            .get("command")
            .and_then(|v| v.as_str())
            .map(|c| format!(" → {}", truncate(c, 40))),
        _ => None,
    }
    .unwrap_or_default();
    format!("Using {name}{detail}")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CostConfig, LlmConfig, ModelPricing};
    use crate::tools::{Tool, ToolResult};
    use secrecy::SecretString;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "claude-sonnet-4-20250514";

    struct FakeReadTool;

    #[async_trait]
    impl Tool for FakeReadTool {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "fake read"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"path": {"type": "string"}}})
        }
        async fn execute(&self, _args: Value) -> crate::Result<ToolResult> {
            Ok(ToolResult::success("hello"))
        }
    }

    struct FakeWriteTool;

    #[async_trait]
    impl Tool for FakeWriteTool {
        fn name(&self) -> &str {
            "write_file"
        }
        fn description(&self) -> &str {
            "fake write"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"path": {"type": "string"}}})
        }
        async fn execute(&self, _args: Value) -> crate::Result<ToolResult> {
            Ok(ToolResult::success("Written 5 chars"))
        }
    }

    fn settings_for(server_uri: &str, budget: f64) -> Settings {
        let mut pricing = HashMap::new();
        pricing.insert(
            MODEL.to_string(),
            ModelPricing {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        );
        Settings {
            llm: LlmConfig {
                base_url: server_uri.to_string(),
                ..LlmConfig::default()
            },
            cost: CostConfig {
                budget_per_task_usd: budget,
                pricing,
            },
            ..Settings::default()
        }
    }

    fn build_loop(settings: Settings, trace: Option<Arc<TraceRecorder>>) -> (AgentLoop, Arc<CostAccountant>) {
        let cost = Arc::new(CostAccountant::new(settings.cost.clone(), trace.clone()));
        let llm = Arc::new(
            LlmClient::new(
                settings.llm.clone(),
                SecretString::from("test-key"),
                cost.clone(),
                trace.clone(),
            )
            .unwrap(),
        );
        let mut tools = ToolRegistry::new(trace.clone());
        tools.register(FakeReadTool).unwrap();
        tools.register(FakeWriteTool).unwrap();
        let agent = AgentLoop::new(settings, llm, Arc::new(tools), cost.clone(), trace);
        (agent, cost)
    }

    fn text_body(text: &str, input_tokens: u64, output_tokens: u64) -> serde_json::Value {
        json!({
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "model": MODEL,
            "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens},
        })
    }

    fn tool_use_body(id: &str, name: &str, input: serde_json::Value) -> serde_json::Value {
        json!({
            "content": [
                {"type": "text", "text": "using a tool"},
                {"type": "tool_use", "id": id, "name": name, "input": input},
            ],
            "stop_reason": "tool_use",
            "model": MODEL,
            "usage": {"input_tokens": 1000, "output_tokens": 1000},
        })
    }

    async fn mount_once(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_single_turn_answer() {
        let server = MockServer::start().await;
        mount_once(&server, text_body("4", 12, 2)).await;

        let trace = Arc::new(TraceRecorder::new("t1", None));
        let (mut agent, _) = build_loop(settings_for(&server.uri(), 0.5), Some(trace.clone()));
        let result = agent.run("what is 2+2?", "").await;

        assert!(result.success);
        assert_eq!(result.response, "4");
        assert_eq!(result.iterations, 1);
        assert!(result.tool_calls_made.is_empty());
        assert!(result.files_modified.is_empty());
        assert_eq!(result.total_tokens, 14);

        let doc = trace.to_json();
        assert_eq!(doc["spans"][0]["name"], "iteration_0");
        let kinds: Vec<&str> = doc["spans"][0]["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["llm_request", "llm_response", "thought"]);
        assert!(doc["spans"][0]["end_time"].is_f64());
    }

    #[tokio::test]
    async fn test_one_tool_call_then_answer() {
        let server = MockServer::start().await;
        mount_once(
            &server,
            tool_use_body("toolu_01", "read_file", json!({"path": "foo.txt"})),
        )
        .await;
        mount_once(&server, text_body("the file says hello", 40, 8)).await;

        let (mut agent, _) = build_loop(settings_for(&server.uri(), 0.5), None);
        let result = agent.run("read foo.txt", "").await;

        assert!(result.success);
        assert_eq!(result.response, "the file says hello");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_calls_made, vec!["read_file"]);
        assert!(result.files_modified.is_empty());
        // The observation landed in working memory
        assert!(agent.memory().contains("last_read_file"));
        assert!(agent
            .memory()
            .to_context_string()
            .contains("last_read_file: hello"));

        // Two round trips: tool_use turn, then the final answer
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_results_answer_the_tool_use() {
        let server = MockServer::start().await;
        mount_once(
            &server,
            tool_use_body("toolu_99", "read_file", json!({"path": "foo.txt"})),
        )
        .await;
        mount_once(&server, text_body("done", 10, 2)).await;

        let (mut agent, _) = build_loop(settings_for(&server.uri(), 0.5), None);
        agent.run("read foo.txt", "").await;

        let requests = server.received_requests().await.unwrap();
        let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        let messages = second["messages"].as_array().unwrap();
        // task, assistant tool_use, tool_result
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_99");
        assert_eq!(messages[2]["content"][0]["is_error"], false);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_stops_task() {
        let server = MockServer::start().await;
        mount_once(
            &server,
            tool_use_body("toolu_01", "read_file", json!({"path": "a.txt"})),
        )
        .await;
        mount_once(&server, text_body("never used", 1000, 1000)).await;

        let trace = Arc::new(TraceRecorder::new("t3", None));
        let (mut agent, cost) = build_loop(settings_for(&server.uri(), 0.001), Some(trace.clone()));
        let result = agent.run("read a.txt", "").await;

        assert!(!result.success);
        assert!(result.response.starts_with("Task stopped: budget exceeded"));
        // The crossing call was recorded; the next one was refused
        assert_eq!(cost.call_count(), 1);
        assert!(!trace.events_of(EventType::BudgetWarning).is_empty());
    }

    #[tokio::test]
    async fn test_zero_iteration_cap_never_calls_llm() {
        let server = MockServer::start().await;
        let mut settings = settings_for(&server.uri(), 0.5);
        settings.llm.max_tool_iterations = 0;

        let (mut agent, cost) = build_loop(settings, None);
        let result = agent.run("anything", "").await;

        assert!(!result.success);
        assert!(result.response.contains("max reached"));
        assert_eq!(result.iterations, 0);
        assert_eq!(cost.call_count(), 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_iteration_cap_message() {
        let server = MockServer::start().await;
        // Model asks for tools forever
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body(
                "toolu_01",
                "read_file",
                json!({"path": "a"}),
            )))
            .mount(&server)
            .await;

        let mut settings = settings_for(&server.uri(), 5.0);
        settings.llm.max_tool_iterations = 2;
        let (mut agent, _) = build_loop(settings, None);
        let result = agent.run("spin", "").await;

        assert!(!result.success);
        assert_eq!(result.response, "Task stopped after 2 iterations (max reached)");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_calls_made.len(), 2);
    }

    #[tokio::test]
    async fn test_write_file_success_tracked() {
        let server = MockServer::start().await;
        mount_once(
            &server,
            tool_use_body("toolu_01", "write_file", json!({"path": "out.py", "content": "x"})),
        )
        .await;
        mount_once(&server, text_body("wrote the file", 10, 5)).await;

        let (mut agent, _) = build_loop(settings_for(&server.uri(), 0.5), None);
        let result = agent.run("write out.py", "").await;

        assert!(result.success);
        assert_eq!(result.files_modified, vec!["out.py"]);
        assert!(result.tool_calls_made.len() >= result.files_modified.len());
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let trace = Arc::new(TraceRecorder::new("t", None));
        let (mut agent, _) = build_loop(settings_for(&server.uri(), 0.5), Some(trace.clone()));
        let result = agent.run("hi", "").await;

        assert!(!result.success);
        assert!(result.response.starts_with("Agent encountered an error:"));
        assert_eq!(trace.events_of(EventType::Error).len(), 1);
    }

    #[test]
    fn test_success_predicate() {
        assert!(is_success("Done! All tests pass."));
        assert!(!is_success(""));
        assert!(!is_success("Agent encountered an error: boom"));
        assert!(!is_success("Task stopped: budget exceeded ($1 of $0.5)"));
        assert!(!is_success("Task stopped after 25 iterations (max reached)"));
    }

    #[test]
    fn test_describe_tool_call_details() {
        assert_eq!(
            describe_tool_call("read_file", &json!({"path": "a.py"})),
            "Using read_file → a.py"
        );
        assert_eq!(
            describe_tool_call("grep", &json!({"pattern": "TODO"})),
            "Using grep → 'TODO'"
        );
        assert_eq!(describe_tool_call("git_status", &json!({})), "Using git_status");
    }
}
