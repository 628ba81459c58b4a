//! Configuration management for the agent runtime
//!
//! Loads layered configuration: built-in defaults, an optional TOML file,
//! and environment overrides (prefix `FORGE__`). The API key is read from
//! `ANTHROPIC_API_KEY` and its absence is a startup-fatal error.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier sent to the provider
    pub model: String,
    /// Base URL of the Messages API
    pub base_url: String,
    /// Maximum tokens to generate per call
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum LLM round-trips per task before the loop is stopped
    pub max_tool_iterations: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            max_tool_iterations: 25,
        }
    }
}

/// Planner configuration for complex task decomposition
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Router score at or above which a task is classified complex
    pub complexity_threshold: f64,
    /// Maximum steps the planner may produce
    pub max_plan_steps: usize,
    /// Consecutive step failures that trigger a replan
    pub replan_after_failures: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            complexity_threshold: 0.6,
            max_plan_steps: 10,
            replan_after_failures: 2,
        }
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Timeout applied to shell commands
    #[serde(with = "humantime_serde")]
    pub shell_timeout: Duration,
    /// Maximum file size the filesystem tools will touch, in bytes
    pub max_file_size: u64,
    /// Whether the shell allowlist is enforced
    pub sandbox_enabled: bool,
    /// Command prefixes the shell tool may spawn when sandboxed
    pub allowed_commands: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        ToolsConfig {
            shell_timeout: Duration::from_secs(30),
            max_file_size: 1_048_576,
            sandbox_enabled: true,
            allowed_commands: [
                "python", "pytest", "ruff", "git", "ls", "cat", "grep", "find", "echo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Working memory configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Capacity of the per-task working memory
    pub max_working_items: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            max_working_items: 20,
        }
    }
}

/// Verification critic configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CriticConfig {
    /// Run the syntax check phase
    pub ast_check: bool,
    /// Run the lint phase
    pub run_lint: bool,
    /// Run the test phase
    pub run_tests: bool,
    /// Run the LLM rubric evaluation
    pub rubric_enabled: bool,
    /// Path handed to the test runner
    pub test_path: String,
}

impl Default for CriticConfig {
    fn default() -> Self {
        CriticConfig {
            ast_check: true,
            run_lint: true,
            run_tests: true,
            rubric_enabled: true,
            test_path: "tests/".to_string(),
        }
    }
}

/// Task chain cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path of the embedded cache database
    pub db_path: String,
    /// Minimum cosine similarity for a lookup hit
    pub similarity_threshold: f32,
    /// Whether the cache is active at all
    pub enabled: bool,
    /// Entry count at which the least-used chain is evicted
    pub max_entries: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            db_path: "data/cache.db".to_string(),
            similarity_threshold: 0.85,
            enabled: true,
            max_entries: 1000,
        }
    }
}

/// Per-model token pricing, in USD per thousand tokens
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Cost tracking and budget configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Hard per-task spend limit in USD
    pub budget_per_task_usd: f64,
    /// Pricing table keyed by model identifier
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for CostConfig {
    fn default() -> Self {
        let mut pricing = HashMap::new();
        pricing.insert(
            "claude-sonnet-4-20250514".to_string(),
            ModelPricing {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        );
        pricing.insert(
            "claude-haiku-4-5-20251001".to_string(),
            ModelPricing {
                input_per_1k: 0.001,
                output_per_1k: 0.005,
            },
        );
        CostConfig {
            budget_per_task_usd: 0.50,
            pricing,
        }
    }
}

/// Trace and observability configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Whether traces are persisted at end-of-task
    pub enabled: bool,
    /// Directory trace files are written under
    pub log_dir: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            enabled: true,
            log_dir: "data/traces".to_string(),
        }
    }
}

/// Root configuration for the agent runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmConfig,
    pub planner: PlannerConfig,
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
    pub critic: CriticConfig,
    pub cache: CacheConfig,
    pub cost: CostConfig,
    pub trace: TraceConfig,
    /// Provider API key; never deserialized from files
    #[serde(skip, default = "empty_secret")]
    pub api_key: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from("")
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            llm: LlmConfig::default(),
            planner: PlannerConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            critic: CriticConfig::default(),
            cache: CacheConfig::default(),
            cost: CostConfig::default(),
            trace: TraceConfig::default(),
            api_key: empty_secret(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file with environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("forgeagent").required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FORGE")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.api_key =
            SecretString::from(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default());
        Ok(settings)
    }

    /// Validate that all required configuration is present
    pub fn validate(&self) -> Result<()> {
        if self.api_key.expose_secret().is_empty() {
            return Err(Error::Config("ANTHROPIC_API_KEY is required".to_string()));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::Config("llm.max_tokens must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.llm.max_tokens, 4096);
        assert_eq!(settings.llm.max_tool_iterations, 25);
        assert_eq!(settings.planner.complexity_threshold, 0.6);
        assert_eq!(settings.tools.shell_timeout, Duration::from_secs(30));
        assert_eq!(settings.cache.similarity_threshold, 0.85);
        assert_eq!(settings.cost.budget_per_task_usd, 0.50);
        assert!(settings.tools.sandbox_enabled);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.api_key = SecretString::from("test-key");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_pricing_covers_default_model() {
        let settings = Settings::default();
        assert!(settings.cost.pricing.contains_key(&settings.llm.model));
    }
}
