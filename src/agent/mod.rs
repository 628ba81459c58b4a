//! Agent module - conversation model, LLM gateway, and the execution engine
//!
//! This module holds the pieces that drive a task from natural language to
//! completed work:
//! - Structured conversation types mirroring the provider wire format
//! - The Messages API client with cost tracking and tracing baked in
//! - The complexity router and LLM-backed planner
//! - The ReAct loop and the orchestrator that wires everything together

pub mod agent_loop;
mod client;
mod conversation;
mod orchestrator;
pub mod planner;
pub mod prompts;
mod router;
pub mod types;

pub use agent_loop::{AgentLoop, NoOpCallback, StatusCallback};
pub use client::LlmClient;
pub use conversation::Conversation;
pub use orchestrator::Orchestrator;
pub use planner::{ExecutionPlan, PlanStep, Planner, StepStatus};
pub use router::{ComplexityRouter, RoutingDecision, TaskComplexity};
pub use types::{
    AgentResult, ContentBlock, LlmResponse, Message, Role, StopReason, ToolDefinition,
};
