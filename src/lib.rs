//! # Forgeagent
//!
//! An autonomous AI coding agent runtime built with Rust.
//!
//! ## Architecture
//!
//! Forgeagent drives a hosted LLM through an iterative reason → act → observe
//! loop, executing structured tool calls on the developer's behalf:
//!
//! - **Agent** (`agent`): conversation model, Messages API gateway, complexity
//!   router, planner, the ReAct loop, and the orchestrator gluing them
//! - **Tools** (`tools`): the structured tool surface (filesystem, search,
//!   shell, git, code checks) behind a uniform schema-deriving contract
//! - **Trace** (`trace`): hierarchical spans and typed events, persisted as
//!   one JSON document per task
//! - **Cost** (`cost`): per-call token ledger with hard budget enforcement
//! - **Memory** (`memory`): bounded LRU working memory injected into the
//!   system prompt each turn
//! - **Cache** (`cache`): similarity-keyed store of proven tool chains
//! - **Critic** (`critic`): syntax/lint/test verification plus LLM rubric
//!   review
//! - **Configuration** (`config`): layered settings with env overrides
//!
//! ## Design principles
//!
//! 1. **Sum types over inheritance**: content blocks, event types, step and
//!    check statuses are closed tagged enums
//! 2. **Schemas from one source**: a tool's input struct produces both its
//!    model-visible JSON Schema and its runtime validator
//! 3. **Errors as data**: only budget exhaustion travels as a distinguished
//!    error; tool failures surface to the model as results it can react to
//! 4. **Builder-style assembly**: collaborators are constructed once and
//!    handed into the loop, not reached through globals
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use forgeagent::config::Settings;
//! use forgeagent::Result;
//!
//! fn main() -> Result<()> {
//!     let settings = Settings::load(None)?;
//!     settings.validate()?;
//!     // Build the runtime and run tasks...
//!     Ok(())
//! }
//! ```

// Agent logic, LLM gateway, and execution engine
pub mod agent;

// Task chain cache keyed by task similarity
pub mod cache;

// Configuration
pub mod config;

// Cost ledger and budget enforcement
pub mod cost;

// Verification critics
pub mod critic;

// Error types
pub mod error;

// Per-task working memory
pub mod memory;

// Tool contract, registry, and built-in tools
pub mod tools;

// Trace spans and events
pub mod trace;

// Re-export commonly used items
pub use error::{Error, Result};

pub use agent::{AgentLoop, AgentResult, LlmClient, Orchestrator};
pub use cost::CostAccountant;
pub use memory::WorkingMemory;
pub use tools::ToolRegistry;
pub use trace::TraceRecorder;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
