use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conductor::config::{ConductorToml, STATE_DIR};

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Step-driven conductor for model-backed coding sessions")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow in a new session
    Run {
        /// Workflow file (JSON or YAML)
        workflow: PathBuf,

        /// Session id (generated when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Wait for pending review markers instead of failing
        #[arg(long)]
        wait_review: bool,
    },
    /// Resume a paused session from its latest checkpoint
    Resume {
        session: String,

        /// Workflow file the session was started with
        workflow: PathBuf,

        /// Wait for pending review markers instead of failing
        #[arg(long)]
        wait_review: bool,
    },
    /// List checkpoints for one session or all sessions
    Checkpoints { session: Option<String> },
    /// Inspect directive manifests
    Directives {
        #[command(subcommand)]
        command: Option<DirectivesCommands>,
    },
    /// Manage human review markers
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum DirectivesCommands {
    /// List discovered handlers
    List,
    /// Fail if any manifest has problems
    Validate,
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// Remove pending review markers so the session can resume
    Clear { session: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default conductor.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let state_dir = project_dir.join(STATE_DIR);
    let toml = ConductorToml::load_or_default(&state_dir)?;
    let _log_guard = conductor::logging::init(&toml.logging, &state_dir.join("logs"), cli.verbose)?;

    match &cli.command {
        Commands::Run {
            workflow,
            session,
            wait_review,
        } => {
            cmd::cmd_run(&cli, &project_dir, workflow, session.as_deref(), *wait_review).await?;
        }
        Commands::Resume {
            session,
            workflow,
            wait_review,
        } => {
            cmd::cmd_resume(&cli, &project_dir, session, workflow, *wait_review).await?;
        }
        Commands::Checkpoints { session } => {
            cmd::cmd_checkpoints(&project_dir, session.as_deref())?
        }
        Commands::Directives { command } => cmd::cmd_directives(&project_dir, command.clone())?,
        Commands::Review { command } => cmd::cmd_review(&project_dir, command)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
