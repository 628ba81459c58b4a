//! Prompt templates for the agent, planner, and evaluator

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::{Error, Result};

/// System prompt for the main agent loop. The working-memory slot is filled
/// fresh on every task so recent observations carry into the next turn.
const SYSTEM_PROMPT: &str = "\
You are Forge, an AI coding agent. You help developers by reading, understanding, and modifying code.

You have access to tools for interacting with the filesystem, running shell commands, searching code, and managing git.

Guidelines:
- Read files before modifying them
- Run tests after making changes
- Explain your reasoning before acting
- If you're unsure, search the codebase first
- Keep changes minimal and focused

{{working_memory}}
";

const PLANNER_PROMPT: &str = "\
You are a task planner for an AI coding agent. Given a complex task,
decompose it into a sequence of concrete, actionable steps.

Rules:
- Each step should be independently executable
- Steps should be ordered by dependency
- Each step should be specific enough to execute without ambiguity
- Include verification steps (run tests, check output) where appropriate
- Maximum {{max_steps}} steps

Output format — return ONLY a numbered list, one step per line:
1. First step description
2. Second step description
...

Task: {{task}}

Context: {{context}}
";

/// System prompt used for planning calls
pub const PLANNER_SYSTEM_PROMPT: &str = "You are a precise task planner.";

/// System prompt used for rubric evaluation calls
pub const EVALUATOR_SYSTEM_PROMPT: &str =
    "You are a precise code reviewer. Respond only with JSON.";

const EVALUATOR_PROMPT: &str = "\
You are a code reviewer evaluating generated code changes. Score each dimension 1-5.

Code being evaluated:
```
{{code}}
```

Task that was requested:
{{task}}

Evaluate on these dimensions:
1. **Correctness** — Does the code do what was requested? Are there logic errors?
2. **Style** — Does it follow the language's conventions (naming, structure)?
3. **Edge Cases** — Does it handle errors, empty inputs, and boundary conditions?
4. **Simplicity** — Is the code minimal and focused, or over-engineered?

Respond with ONLY valid JSON:
{
    \"correctness\": {\"score\": 1-5, \"reasoning\": \"...\"},
    \"style\": {\"score\": 1-5, \"reasoning\": \"...\"},
    \"edge_cases\": {\"score\": 1-5, \"reasoning\": \"...\"},
    \"simplicity\": {\"score\": 1-5, \"reasoning\": \"...\"},
    \"overall_verdict\": \"pass\" or \"fail\",
    \"suggestions\": [\"suggestion 1\", \"suggestion 2\"]
}
";

/// A prompt template using Handlebars syntax
pub struct PromptTemplate {
    name: String,
    registry: Handlebars<'static>,
}

impl PromptTemplate {
    /// Create a new prompt template
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self> {
        let name = name.into();
        let mut registry = Handlebars::new();
        // Prompts are plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(&name, template)
            .map_err(|e| Error::Internal(format!("Invalid template: {e}")))?;
        Ok(PromptTemplate { name, registry })
    }

    /// Render the template with given data
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| Error::Internal(format!("Template render error: {e}")))
    }
}

/// Render the agent system prompt with working memory and optional context
pub fn system_prompt(working_memory: &str, context: &str) -> Result<String> {
    let template = PromptTemplate::new("system", SYSTEM_PROMPT)?;
    let mut rendered = template.render(&json!({ "working_memory": working_memory }))?;
    if !context.is_empty() {
        rendered.push_str(&format!("\n\nContext:\n{context}"));
    }
    Ok(rendered)
}

/// Render the planner decomposition prompt
pub fn planner_prompt(task: &str, context: &str, max_steps: usize) -> Result<String> {
    let template = PromptTemplate::new("planner", PLANNER_PROMPT)?;
    template.render(&json!({
        "max_steps": max_steps,
        "task": task,
        "context": if context.is_empty() { "(no additional context)" } else { context },
    }))
}

/// Render the rubric evaluation prompt
pub fn evaluator_prompt(code: &str, task: &str) -> Result<String> {
    let template = PromptTemplate::new("evaluator", EVALUATOR_PROMPT)?;
    template.render(&json!({ "code": code, "task": task }))
}
