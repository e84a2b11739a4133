//! Motolaw CLI
//!
//! Main entry point for the motolaw command-line tool.
//! Answers motorcycle traffic regulation questions from a local knowledge
//! base, live web search, or the model itself.

mod commands;
mod wiring;

use clap::{Parser, Subcommand};
use commands::{AskCommand, HistoryCommand, KnowledgeCommand, ServeCommand};
use motolaw_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppError, AppResult,
};
use std::path::PathBuf;

/// Motolaw - motorcycle traffic regulation Q&A
#[derive(Parser, Debug)]
#[command(name = "motolaw")]
#[command(about = "Motorcycle traffic regulation Q&A with self-checking answers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "MOTOLAW_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "MOTOLAW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (openai, ollama)
    #[arg(short, long, global = true, env = "MOTOLAW_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "MOTOLAW_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Serve the question endpoint over HTTP
    Serve(ServeCommand),

    /// Knowledge base management
    Knowledge(KnowledgeCommand),

    /// Show recent conversations
    History(HistoryCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let log_format = LogFormat::parse(&cli.log_format).ok_or_else(|| {
        AppError::Config(format!(
            "Unknown log format: {} (expected pretty or json)",
            cli.log_format
        ))
    })?;

    let config = AppConfig::load_with(cli.workspace, cli.config)?.with_overrides(
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, log_format)?;

    tracing::info!("Motolaw CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Serve(_) => "serve",
        Commands::Knowledge(_) => "knowledge",
        Commands::History(_) => "history",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(&config).await,
        Commands::Knowledge(cmd) => cmd.execute(&config).await,
        Commands::History(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
