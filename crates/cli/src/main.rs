//! Planes CLI
//!
//! Main entry point for the planes command-line tool.
//! Answers questions about the 2026 Costa Rica government plans.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ImportCommand, PartiesCommand, PromptsCommand, StatsCommand};
use planes_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Planes CLI - questions and answers over the 2026 government plans
#[derive(Parser, Debug)]
#[command(name = "planes")]
#[command(about = "Questions and answers over the 2026 Costa Rica government plans", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "PLANES_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "PLANES_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, openai)
    #[arg(short, long, global = true, env = "PLANES_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "PLANES_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question about the government plans
    Ask(AskCommand),

    /// List the registered parties
    Parties(PartiesCommand),

    /// Embed and store passages from a JSONL file
    Import(ImportCommand),

    /// Show passage store statistics
    Stats(StatsCommand),

    /// List built-in prompts and workspace overrides
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // The config file is located from the final workspace, so both go in first
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?;

    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("Planes CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_planes_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Parties(_) => "parties",
        Commands::Import(_) => "import",
        Commands::Stats(_) => "stats",
        Commands::Prompts(_) => "prompts",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Parties(cmd) => cmd.execute(&config).await,
        Commands::Import(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
