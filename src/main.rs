use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loopwarden::config::LoopConfig;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "loopwarden")]
#[command(version, about = "Agent stop-hook orchestrator - drive test-and-fix loops through planned phases")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to stderr as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one orchestrator turn (stop-hook JSON on stdin, JSON on stdout)
    Orchestrate,
    /// Run one golden-path grind turn (stop-hook JSON on stdin, JSON on stdout)
    Grind,
    /// Show the current plan, phase and history
    Status,
    /// Show the plan the current changes would produce, without writing anything
    Plan,
    /// Record that an agent phase is complete
    MarkDone {
        /// Phase name, e.g. EVENT_SCHEMA
        phase: String,
    },
    /// Forget the current run so the next turn plans from scratch
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default loopwarden.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = LoopConfig::with_cli_args(project_dir.clone(), cli.verbose);
    let log_dir = match &config {
        Ok(c) if c.toml.logging.file => Some(c.log_dir()),
        _ => None,
    };
    let _log_guard = loopwarden::logging::init_tracing(cli.verbose, cli.log_json, log_dir.as_deref());

    match &cli.command {
        Commands::Orchestrate => cmd::cmd_orchestrate(&config?).await?,
        Commands::Grind => cmd::cmd_grind(&config?).await?,
        Commands::Status => cmd::cmd_status(&config?)?,
        Commands::Plan => cmd::cmd_plan(&config?).await?,
        Commands::MarkDone { phase } => cmd::cmd_mark_done(&config?, phase)?,
        Commands::Reset { force } => cmd::cmd_reset(&config?, *force)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
