//! Tools module - the agent's structured tool surface
//!
//! Each tool is a self-contained type implementing the [`Tool`] trait with a
//! schemars-derived input schema. Tools are registered into a [`ToolRegistry`]
//! and surfaced to the LLM as provider tool definitions.
//!
//! ## Built-in tools
//!
//! - **read_file / write_file / list_directory / glob**: workspace filesystem
//! - **grep**: regex content search
//! - **shell**: allowlisted command execution with timeouts
//! - **git_status / git_diff / git_log / git_commit**: version control
//! - **ast_check / lint / run_tests**: code verification
//!
//! ## Adding a new tool
//!
//! 1. Create a file in `src/tools/` with an input struct deriving
//!    `Deserialize + JsonSchema`
//! 2. Implement the `Tool` trait
//! 3. Add `mod`/`pub use` lines here and register it in
//!    [`register_builtin_tools`]

mod code;
mod filesystem;
mod git;
mod registry;
mod search;
mod shell;
mod traits;

pub use registry::ToolRegistry;
pub use traits::{Tool, ToolResult};

pub use code::{AstCheckTool, LintTool, TestRunnerTool};
pub use filesystem::{GlobTool, ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use git::{GitCommitTool, GitDiffTool, GitLogTool, GitStatusTool};
pub use search::GrepTool;
pub use shell::ShellTool;

use crate::config::ToolsConfig;
use crate::Result;

/// Register the full built-in tool set into a registry
pub fn register_builtin_tools(registry: &mut ToolRegistry, config: &ToolsConfig) -> Result<()> {
    registry.register(ReadFileTool::new(config.max_file_size))?;
    registry.register(WriteFileTool::new(config.max_file_size))?;
    registry.register(ListDirectoryTool)?;
    registry.register(GlobTool)?;
    registry.register(GrepTool)?;
    registry.register(ShellTool::new(config.clone()))?;
    registry.register(GitStatusTool)?;
    registry.register(GitDiffTool)?;
    registry.register(GitLogTool)?;
    registry.register(GitCommitTool)?;
    registry.register(AstCheckTool)?;
    registry.register(LintTool)?;
    registry.register(TestRunnerTool)?;
    Ok(())
}
