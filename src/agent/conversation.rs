//! Conversation management

use crate::agent::types::{ContentBlock, Message, Role};

/// Message history for a single agent session.
///
/// The system prompt is kept out of the message list and sent as its own
/// request field. Tool results are appended as one user message per batch,
/// answering the tool_use blocks of the preceding assistant turn.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// System prompt sent alongside (never inside) the message list
    pub system_prompt: String,
    /// Ordered message history
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Conversation {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    /// Append a user text message
    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append an assistant message from LLM response content
    pub fn add_assistant_message(&mut self, content: Vec<ContentBlock>) {
        self.messages.push(Message::assistant(content));
    }

    /// Append a batch of tool results as a single user message
    pub fn add_tool_results(&mut self, results: Vec<ContentBlock>) {
        self.messages.push(Message {
            role: Role::User,
            content: results,
        });
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Rough token count estimate (4 chars per token heuristic)
    pub fn token_estimate(&self) -> usize {
        let mut chars = self.system_prompt.len();
        for msg in &self.messages {
            for block in &msg.content {
                chars += match block {
                    ContentBlock::Text { text } => text.len(),
                    ContentBlock::ToolResult { content, .. } => content.len(),
                    ContentBlock::ToolUse { input, .. } => input.to_string().len(),
                };
            }
        }
        chars / 4
    }
}
