//! Core tool trait and result types
//!
//! Each tool declares a `#[derive(Deserialize, JsonSchema)]` input struct.
//! The JSON Schema shown to the model and the runtime validator both come
//! from that one type, so they cannot drift apart.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::agent::types::ToolDefinition;
use crate::{Error, Result};

/// A tool that can be called by the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable tool description
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input, derived from its input struct
    fn input_schema(&self) -> Value;

    /// Execute the tool with raw arguments from the model
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Execute with an exception trap.
    ///
    /// Any error escaping `execute` is converted into a failed result; a raw
    /// error must never propagate out of a tool into the engine.
    async fn safe_execute(&self, args: Value) -> ToolResult {
        match self.execute(args).await {
            Ok(result) => result,
            Err(e) => {
                error!("Tool {} failed: {}", self.name(), e);
                ToolResult::failure(e.to_string())
            }
        }
    }

    /// Provider-format tool definition
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Standard result from tool execution.
///
/// Never partially populated: a successful result carries no error, a failed
/// result always carries one, and `output` is always present (possibly empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        ToolResult {
            output: output.into(),
            success: true,
            error: None,
        }
    }

    /// Create a failed result with no output
    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult {
            output: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// Create a failed result that still carries tool output
    pub fn failure_with_output(output: impl Into<String>, error: impl Into<String>) -> Self {
        ToolResult {
            output: output.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Derive the model-visible input schema from a tool's input struct
pub(crate) fn input_schema_for<T: schemars::JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        // Provider schemas carry neither meta-schema nor title
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// Validate raw model arguments against a tool's input struct
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::InvalidInput(format!("Invalid tool arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct ProbeInput {
        /// A file path
        path: String,
        #[serde(default)]
        #[allow(dead_code)]
        limit: usize,
    }

    struct ProbeTool;

    #[async_trait]
    impl Tool for ProbeTool {
        fn name(&self) -> &str {
            "probe"
        }
        fn description(&self) -> &str {
            "test probe"
        }
        fn input_schema(&self) -> Value {
            input_schema_for::<ProbeInput>()
        }
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            let input: ProbeInput = parse_args(args)?;
            Ok(ToolResult::success(input.path))
        }
    }

    #[test]
    fn test_result_invariants() {
        let ok = ToolResult::success("done");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ToolResult::failure("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.output.is_empty());

        let partial = ToolResult::failure_with_output("stdout text", "Exit code 2");
        assert!(!partial.success);
        assert_eq!(partial.output, "stdout text");
    }

    #[test]
    fn test_schema_derived_from_input_struct() {
        let schema = input_schema_for::<ProbeInput>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["path"].is_object());
        // Defaulted fields are not required
        let required: Vec<_> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["path"]);
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
    }

    #[tokio::test]
    async fn test_safe_execute_traps_invalid_args() {
        let tool = ProbeTool;
        let result = tool.safe_execute(json!({"limit": 3})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_definition_carries_schema() {
        let def = ProbeTool.definition();
        assert_eq!(def.name, "probe");
        assert_eq!(def.input_schema["type"], "object");
    }
}
