//! LLM gateway - Messages API client with cost tracking and tracing
//!
//! Sends conversations (with tool definitions) to the provider, parses the
//! structured content blocks back out, and feeds the cost accountant and
//! trace recorder on every call. Transient provider failures (rate limits,
//! server errors) are retried with exponential backoff.

use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::conversation::Conversation;
use crate::agent::types::{LlmResponse, MessagesRequest, MessagesResponse, ToolDefinition};
use crate::config::LlmConfig;
use crate::cost::CostAccountant;
use crate::trace::{EventType, TraceRecorder};
use crate::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client with integrated cost tracking and tracing
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    api_key: SecretString,
    cost: Arc<CostAccountant>,
    trace: Option<Arc<TraceRecorder>>,
}

impl LlmClient {
    pub fn new(
        config: LlmConfig,
        api_key: SecretString,
        cost: Arc<CostAccountant>,
        trace: Option<Arc<TraceRecorder>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(LlmClient {
            client,
            config,
            api_key,
            cost,
            trace,
        })
    }

    /// The configured default model
    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    /// Send a conversation to the provider and parse the response.
    ///
    /// Budget exhaustion raised by the cost accountant escapes this method;
    /// the agent loop is the only caller allowed to catch it.
    pub async fn chat(
        &self,
        conversation: &Conversation,
        tools: Option<&[ToolDefinition]>,
        model_override: Option<&str>,
        max_tokens_override: Option<u32>,
    ) -> Result<LlmResponse> {
        let model = model_override.unwrap_or(&self.config.model);
        let max_tokens = max_tokens_override.unwrap_or(self.config.max_tokens);

        let request = MessagesRequest {
            model,
            max_tokens,
            temperature: self.config.temperature,
            system: (!conversation.system_prompt.is_empty())
                .then_some(conversation.system_prompt.as_str()),
            messages: &conversation.messages,
            tools: tools.filter(|t| !t.is_empty()),
        };

        if let Some(trace) = &self.trace {
            trace.record(
                EventType::LlmRequest,
                json!({
                    "model": model,
                    "message_count": conversation.messages.len(),
                    "tool_count": tools.map(|t| t.len()).unwrap_or(0),
                }),
            );
        }

        debug!(
            "Sending request to {} ({} messages)",
            model,
            conversation.messages.len()
        );

        let response = self.send_with_retry(&request).await?;
        let usage = response.usage;

        // Budget enforcement happens here and may escape to the loop
        self.cost.record_call(
            model,
            usage.input_tokens,
            usage.output_tokens,
            usage.cache_read_input_tokens,
        )?;

        if let Some(trace) = &self.trace {
            trace.record(
                EventType::LlmResponse,
                json!({
                    "model": model,
                    "stop_reason": response.stop_reason.to_string(),
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                    "cache_read_tokens": usage.cache_read_input_tokens,
                    "has_tool_calls": response.stop_reason == crate::agent::types::StopReason::ToolUse,
                }),
            );
        }

        debug!(
            "Response: stop={}, tokens={}/{}",
            response.stop_reason, usage.input_tokens, usage.output_tokens
        );

        Ok(LlmResponse {
            content: response.content,
            stop_reason: response.stop_reason,
            model: response.model,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
        })
    }

    async fn send_with_retry(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(Duration::from_secs(15)))
            .build();

        backoff::future::retry(policy, || async {
            self.send_once(request).await.map_err(|e| {
                if is_transient(&e) {
                    warn!("Transient provider error, retrying: {}", e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    async fn send_once(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<MessagesResponse>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            429 => Err(Error::RateLimit(body)),
            401 => Err(Error::Api("Invalid API key".to_string())),
            code if code >= 500 => Err(Error::Api(format!("server error ({status}): {body}"))),
            _ => Err(Error::Api(format!("API error ({status}): {body}"))),
        }
    }
}

fn is_transient(error: &Error) -> bool {
    match error {
        Error::Api(msg) => msg.starts_with("server error"),
        other => other.is_retryable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::{ContentBlock, StopReason};
    use crate::config::CostConfig;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str, trace: Option<Arc<TraceRecorder>>) -> LlmClient {
        let config = LlmConfig {
            base_url: server_uri.to_string(),
            ..LlmConfig::default()
        };
        let cost = Arc::new(CostAccountant::new(CostConfig::default(), None));
        LlmClient::new(config, SecretString::from("test-key"), cost, trace).unwrap()
    }

    fn text_response() -> serde_json::Value {
        json!({
            "content": [{"type": "text", "text": "4"}],
            "stop_reason": "end_turn",
            "model": "claude-sonnet-4-20250514",
            "usage": {"input_tokens": 12, "output_tokens": 3},
        })
    }

    #[tokio::test]
    async fn test_chat_parses_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response()))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let mut conversation = Conversation::new("sys");
        conversation.add_user_message("what is 2+2?");

        let response = client.chat(&conversation, None, None, None).await.unwrap();
        assert_eq!(response.text(), "4");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert!(!response.has_tool_calls());
        assert_eq!(response.total_tokens(), 15);
    }

    #[tokio::test]
    async fn test_chat_parses_tool_use_blocks_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "reading the file"},
                    {"type": "tool_use", "id": "toolu_01", "name": "read_file",
                     "input": {"path": "foo.txt"}},
                ],
                "stop_reason": "tool_use",
                "model": "claude-sonnet-4-20250514",
                "usage": {"input_tokens": 20, "output_tokens": 10},
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let mut conversation = Conversation::new("");
        conversation.add_user_message("read foo.txt");

        let response = client.chat(&conversation, None, None, None).await.unwrap();
        assert!(response.has_tool_calls());
        let calls: Vec<_> = response.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            calls[0],
            ContentBlock::ToolUse { name, .. } if name == "read_file"
        ));
    }

    #[tokio::test]
    async fn test_empty_system_prompt_omitted_from_request() {
        let server = MockServer::start().await;
        // Matcher would reject a request carrying a "system" key
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"model": "claude-sonnet-4-20250514"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let mut conversation = Conversation::new("");
        conversation.add_user_message("hi");
        let response = client.chat(&conversation, None, None, None).await.unwrap();
        assert_eq!(response.text(), "4");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_chat_emits_request_and_response_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response()))
            .mount(&server)
            .await;

        let trace = Arc::new(TraceRecorder::new("t", None));
        let client = client_for(&server.uri(), Some(trace.clone()));
        let mut conversation = Conversation::new("sys");
        conversation.add_user_message("hi");
        client.chat(&conversation, None, None, None).await.unwrap();

        let requests = trace.events_of(EventType::LlmRequest);
        let responses = trace.events_of(EventType::LlmResponse);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].data["message_count"], 1);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data["stop_reason"], "end_turn");
        assert_eq!(responses[0].data["has_tool_calls"], false);
    }

    #[tokio::test]
    async fn test_auth_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let mut conversation = Conversation::new("");
        conversation.add_user_message("hi");
        let err = client.chat(&conversation, None, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Api(msg) if msg.contains("Invalid API key")));
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response()))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let mut conversation = Conversation::new("");
        conversation.add_user_message("hi");
        let response = client.chat(&conversation, None, None, None).await.unwrap();
        assert_eq!(response.text(), "4");
    }
}
