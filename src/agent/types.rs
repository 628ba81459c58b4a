//! Type definitions for the agent module
//!
//! The conversation model mirrors the provider wire format: messages carry
//! ordered lists of structured content blocks (text, tool_use, tool_result)
//! and serialize to the Messages API shape directly.

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message (including tool results fed back to the model)
    User,
    /// Assistant (model) response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A structured content block within a message.
///
/// Tagged union over the three provider block kinds; the serde representation
/// is exactly the wire format, so encoding/decoding needs no adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// A tool invocation emitted by the model
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The runtime's answer to a tool invocation
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// A conversation message with structured content blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user text message
    pub fn user(text: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create an assistant message from response content blocks
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Message {
            role: Role::Assistant,
            content,
        }
    }

    /// Concatenated text from all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All tool_use blocks in this message, in order
    pub fn tool_calls(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// A tool definition in provider format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::ToolUse => write!(f, "tool_use"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
        }
    }
}

/// Request body for the Messages API
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [ToolDefinition]>,
}

/// Token usage block in a provider response
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Raw response body from the Messages API
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
}

/// Parsed response handed to the agent loop
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
}

impl LlmResponse {
    /// Whether the response contains tool invocations to execute
    pub fn has_tool_calls(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
    }

    /// All tool_use blocks, in emission order
    pub fn tool_calls(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// Concatenated text from all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Result of a single agent task execution
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentResult {
    pub success: bool,
    pub response: String,
    pub iterations: u32,
    pub tool_calls_made: Vec<String>,
    pub files_modified: Vec<String>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_block_wire_format() {
        let block = ContentBlock::ToolUse {
            id: "toolu_01".into(),
            name: "read_file".into(),
            input: json!({"path": "foo.txt"}),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tool_use",
                "id": "toolu_01",
                "name": "read_file",
                "input": {"path": "foo.txt"},
            })
        );

        let parsed: ContentBlock = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn test_tool_result_is_error_defaults_false() {
        let parsed: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "toolu_01",
            "content": "hello",
        }))
        .unwrap();
        assert_eq!(parsed, ContentBlock::tool_result("toolu_01", "hello", false));
    }

    #[test]
    fn test_message_text_joins_blocks() {
        let msg = Message::assistant(vec![
            ContentBlock::text("first"),
            ContentBlock::ToolUse {
                id: "t1".into(),
                name: "grep".into(),
                input: json!({}),
            },
            ContentBlock::text("second"),
        ]);
        assert_eq!(msg.text(), "first\nsecond");
        assert_eq!(msg.tool_calls().count(), 1);
    }

    #[test]
    fn test_stop_reason_parses_from_wire() {
        let reason: StopReason = serde_json::from_value(json!("tool_use")).unwrap();
        assert_eq!(reason, StopReason::ToolUse);
        assert_eq!(reason.to_string(), "tool_use");
    }

    #[test]
    fn test_has_tool_calls_follows_stop_reason() {
        let response = LlmResponse {
            content: vec![ContentBlock::text("thinking")],
            stop_reason: StopReason::EndTurn,
            model: "m".into(),
            input_tokens: 1,
            output_tokens: 1,
            cache_read_tokens: 0,
        };
        assert!(!response.has_tool_calls());
        assert_eq!(response.total_tokens(), 2);
    }

    #[test]
    fn test_request_skips_empty_optionals() {
        let messages = vec![Message::user("hi")];
        let request = MessagesRequest {
            model: "m",
            max_tokens: 16,
            temperature: 0.0,
            system: None,
            messages: &messages,
            tools: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("system").is_none());
        assert!(value.get("tools").is_none());
    }
}
