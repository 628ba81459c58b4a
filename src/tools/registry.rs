//! Tool registry - manages available tools and dispatches execution

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

use crate::agent::types::ToolDefinition;
use crate::trace::{EventType, TraceRecorder};
use crate::{Error, Result};

use super::traits::{Tool, ToolResult};

/// Registry that maps tool names to implementations.
///
/// Generates provider tool definitions, dispatches execution through the
/// `safe_execute` trap, and wraps each call in tool_call / tool_result trace
/// events. Tool output never goes into the trace, only its length and an
/// error summary, since outputs can be large.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    trace: Option<Arc<TraceRecorder>>,
}

impl ToolRegistry {
    pub fn new(trace: Option<Arc<TraceRecorder>>) -> Self {
        ToolRegistry {
            tools: Vec::new(),
            trace,
        }
    }

    /// Register a tool. Duplicate names are refused.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(Error::AlreadyRegistered(tool.name().to_string()));
        }
        debug!("Registered tool: {}", tool.name());
        self.tools.push(Box::new(tool));
        Ok(())
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Execute a tool by name with the given input.
    ///
    /// An unknown name yields a failed result rather than an error.
    pub async fn execute(&self, name: &str, input: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            error!("Unknown tool: {}", name);
            return ToolResult::failure(format!("Unknown tool: {name}"));
        };

        if let Some(trace) = &self.trace {
            trace.record(
                EventType::ToolCall,
                json!({
                    "tool": name,
                    "input": input,
                }),
            );
        }

        let result = tool.safe_execute(input).await;

        if let Some(trace) = &self.trace {
            trace.record(
                EventType::ToolResult,
                json!({
                    "tool": name,
                    "success": result.success,
                    "output_length": result.output.len(),
                    "error": result.error.as_deref().map(summarize_error),
                }),
            );
        }

        result
    }

    /// Tool definitions for all registered tools, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// All registered tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// First line of an error, capped at 200 chars, for trace events
fn summarize_error(error: &str) -> String {
    let first_line = error.lines().next().unwrap_or_default();
    first_line.chars().take(200).collect()
}
