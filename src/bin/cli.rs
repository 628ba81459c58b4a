//! Forgeagent CLI
//!
//! Single-shot task execution or an interactive REPL over the agent runtime.

use clap::Parser;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use forgeagent::agent::{Orchestrator, StatusCallback};
use forgeagent::cache::{HashEmbedder, TaskCache};
use forgeagent::config::Settings;
use forgeagent::cost::CostAccountant;
use forgeagent::tools::{register_builtin_tools, ToolRegistry};
use forgeagent::trace::TraceRecorder;
use forgeagent::{AgentResult, LlmClient, VERSION};

#[derive(Parser)]
#[command(
    name = "forgeagent",
    version = VERSION,
    about = "Forgeagent - AI coding agent",
    long_about = None
)]
struct Cli {
    /// Task to execute (omit for interactive mode)
    task: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Streams loop progress ("Thinking…", "Using read_file → …") to the terminal
struct ConsoleStatus;

#[async_trait::async_trait]
impl StatusCallback for ConsoleStatus {
    async fn on_status(&self, message: &str) {
        println!("{}", style(message).dim());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,forgeagent=debug"
    } else {
        "warn,forgeagent=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    if let Err(e) = settings.validate() {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        eprintln!("Set ANTHROPIC_API_KEY in the environment or a .env file.");
        std::process::exit(1);
    }

    // Process-wide resources: the chain cache survives across tasks
    let cache = if settings.cache.enabled {
        match TaskCache::open(settings.cache.clone(), Arc::new(HashEmbedder::default()), None).await
        {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!("Task cache unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let exit_code = match &cli.task {
        Some(task) => run_single(task, &settings, cache).await,
        None => {
            run_interactive(&settings, cache).await;
            0
        }
    };
    std::process::exit(exit_code);
}

/// Build a fresh per-task runtime (trace, accountant, gateway, tools, loop)
fn build_orchestrator(
    settings: &Settings,
    cache: Option<Arc<TaskCache>>,
) -> anyhow::Result<(Orchestrator, Arc<TraceRecorder>)> {
    let task_id = Uuid::new_v4().simple().to_string()[..8].to_string();
    let log_dir = settings
        .trace
        .enabled
        .then(|| std::path::PathBuf::from(&settings.trace.log_dir));
    let trace = Arc::new(TraceRecorder::new(task_id, log_dir));

    let cost = Arc::new(CostAccountant::new(settings.cost.clone(), Some(trace.clone())));
    let llm = Arc::new(LlmClient::new(
        settings.llm.clone(),
        settings.api_key.clone(),
        cost.clone(),
        Some(trace.clone()),
    )?);

    let mut tools = ToolRegistry::new(Some(trace.clone()));
    register_builtin_tools(&mut tools, &settings.tools)?;

    let mut orchestrator = Orchestrator::new(
        settings.clone(),
        llm,
        Arc::new(tools),
        cost,
        Some(trace.clone()),
        cache,
    );
    orchestrator.agent_mut().set_callback(Arc::new(ConsoleStatus));
    Ok((orchestrator, trace))
}

async fn run_task(
    task: &str,
    settings: &Settings,
    cache: Option<Arc<TaskCache>>,
) -> anyhow::Result<AgentResult> {
    let (mut orchestrator, trace) = build_orchestrator(settings, cache)?;
    let result = orchestrator.run(task, "").await;

    // Persistence failures are logged, never fatal
    match trace.save() {
        Ok(Some(path)) => println!("{}", style(format!("Trace saved: {}", path.display())).dim()),
        Ok(None) => {}
        Err(e) => warn!("Failed to save trace: {}", e),
    }
    Ok(result)
}

async fn run_single(task: &str, settings: &Settings, cache: Option<Arc<TaskCache>>) -> i32 {
    let result = match run_task(task, settings, cache).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return 1;
        }
    };
    display_result(&result);
    if result.success {
        0
    } else {
        1
    }
}

async fn run_interactive(settings: &Settings, cache: Option<Arc<TaskCache>>) {
    println!("{}", style("Forgeagent — AI coding agent").blue().bold());
    println!("{}", style("Type your task, or 'quit' to exit.").dim());
    println!();

    loop {
        let task: String = match Input::with_theme(&ColorfulTheme::default())
            .with_prompt(">")
            .allow_empty(true)
            .interact_text()
        {
            Ok(task) => task,
            Err(_) => break,
        };

        let task = task.trim().to_string();
        if task.is_empty() {
            continue;
        }
        if matches!(task.as_str(), "quit" | "exit" | "q") {
            break;
        }

        match run_task(&task, settings, cache.clone()).await {
            Ok(result) => display_result(&result),
            Err(e) => eprintln!("{} {}", style("Error:").red().bold(), e),
        }
        println!();
    }
}

fn display_result(result: &AgentResult) {
    println!();
    let header = if result.success {
        style("Forge").green().bold()
    } else {
        style("Forge").red().bold()
    };
    println!("{header}");
    println!(
        "{}",
        if result.response.is_empty() {
            "(no response)"
        } else {
            result.response.as_str()
        }
    );
    println!();
    println!("  {}  {}", style("Iterations").dim(), result.iterations);
    println!(
        "  {}  {}",
        style("Tool calls").dim(),
        result.tool_calls_made.len()
    );
    println!(
        "  {}  {}",
        style("Files modified").dim(),
        result.files_modified.len()
    );
    println!("  {}  {}", style("Tokens").dim(), result.total_tokens);
    println!(
        "  {}  ${:.4}",
        style("Cost").dim(),
        result.total_cost_usd
    );
    println!(
        "  {}  {:.1}s",
        style("Duration").dim(),
        result.duration_seconds
    );
}
