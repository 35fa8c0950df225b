//! `troupe` — run and resume multi-agent workflows from a TOML config.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use troupe_agent::{AgentConfig, AgentRole, ModelConfig};
use troupe_builtins::{EchoTool, HttpFetchTool, TextStatsTool};
use troupe_checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
};
use troupe_tools::ToolRegistry;
use troupe_workflow::{CommunicationPattern, RunOutcome, WorkflowEngine};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "troupe", about = "Troupe — multi-agent workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "troupe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow from an initial message
    Run {
        /// The initial user message
        message: String,
        /// Turn budget (overrides config)
        #[arg(long)]
        max_turns: Option<u32>,
    },
    /// Resume a run from a checkpoint
    Resume {
        /// Checkpoint id to resume from
        checkpoint_id: Uuid,
    },
    /// List checkpoints for a run
    Checkpoints {
        /// The run id
        run_id: Uuid,
    },
}

#[derive(Deserialize)]
struct TroupeConfig {
    /// Default model for agents that do not set their own.
    model: ModelConfig,
    #[serde(default = "default_pattern")]
    pattern: String,
    #[serde(default = "default_max_turns")]
    max_turns: u32,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default = "default_store")]
    checkpoint_store: String,
    agents: Vec<AgentEntry>,
}

#[derive(Deserialize)]
struct AgentEntry {
    name: String,
    role: AgentRole,
    system_message: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    critical: Option<bool>,
    /// Per-agent model override.
    #[serde(default)]
    model: Option<ModelConfig>,
}

fn default_pattern() -> String {
    "sequential".to_string()
}

fn default_max_turns() -> u32 {
    troupe_core::DEFAULT_MAX_TURNS
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".troupe")
}

fn default_store() -> String {
    "sqlite".to_string()
}

impl TroupeConfig {
    fn agent_configs(&self) -> Vec<AgentConfig> {
        self.agents
            .iter()
            .map(|entry| {
                let mut model = entry.model.clone().unwrap_or_else(|| self.model.clone());
                // Environment always wins for credentials.
                if let Ok(key) = std::env::var("TROUPE_API_KEY") {
                    model.api_key = key;
                }
                let mut config = AgentConfig::new(
                    entry.name.as_str(),
                    entry.role,
                    entry.system_message.as_str(),
                    model,
                )
                .with_tools(entry.tools.clone());
                config.critical = entry.critical;
                config
            })
            .collect()
    }
}

async fn build_store(config: &TroupeConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    Ok(match config.checkpoint_store.as_str() {
        "memory" => Arc::new(MemoryCheckpointStore::new()),
        "file" => Arc::new(FileCheckpointStore::new(config.data_dir.join("checkpoints")).await?),
        "sqlite" => {
            tokio::fs::create_dir_all(&config.data_dir).await?;
            let db_path = config.data_dir.join("checkpoints.db");
            let path = db_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Non-UTF8 data_dir"))?;
            Arc::new(SqliteCheckpointStore::new(path)?)
        }
        other => anyhow::bail!("Unknown checkpoint_store '{other}' (memory|file|sqlite)"),
    })
}

fn build_registry() -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool::new()));
    registry.register(Arc::new(TextStatsTool::new()));
    registry.register(Arc::new(HttpFetchTool::new()?));
    Ok(registry)
}

fn print_outcome(outcome: &RunOutcome) {
    println!("run id:     {}", outcome.run_id);
    println!("status:     {:?}", outcome.status);
    println!("messages:   {}", outcome.messages.len());
    for warning in &outcome.warnings {
        println!("warning:    {warning}");
    }
    let totals = outcome.metrics.totals();
    println!(
        "turns:      {} ({} tool calls, {} errors)",
        totals.turns, totals.tool_calls, totals.errors
    );
    println!("\n{}", outcome.synthesized_result);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", cli.config.display()))?;
    let config: TroupeConfig = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", cli.config.display()))?;

    let pattern: CommunicationPattern = config.pattern.parse()?;
    let store = build_store(&config).await?;
    let registry = Arc::new(build_registry()?);

    let engine = WorkflowEngine::from_configs(
        config.agent_configs(),
        pattern,
        registry,
        store.clone(),
    )?;

    match cli.command {
        Commands::Run { message, max_turns } => {
            let mut metadata = HashMap::new();
            metadata.insert(
                "max_turns".to_string(),
                serde_json::json!(max_turns.unwrap_or(config.max_turns)),
            );
            info!(pattern = %pattern, agents = config.agents.len(), "Starting run");
            let outcome = engine.run(&message, metadata).await?;
            print_outcome(&outcome);
        }
        Commands::Resume { checkpoint_id } => {
            let outcome = engine.resume(checkpoint_id).await?;
            print_outcome(&outcome);
        }
        Commands::Checkpoints { run_id } => {
            let checkpoints = store.list(run_id).await?;
            if checkpoints.is_empty() {
                println!("No checkpoints for run {run_id}");
            }
            for checkpoint in checkpoints {
                println!(
                    "turn {:>4}  {}  {}",
                    checkpoint.turn, checkpoint.id, checkpoint.created_at
                );
            }
        }
    }

    Ok(())
}
