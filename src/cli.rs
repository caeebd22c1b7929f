//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// Stratus - Manage a project's deployment stacks
#[derive(Parser, Debug)]
#[command(name = "stratus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Project root directory
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    project_dir: PathBuf,

    /// Directory for per-user state (provider records, refresh trigger)
    #[arg(long, global = true, value_name = "DIR", env = "STRATUS_USER_DIR")]
    user_dir: Option<PathBuf>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the project's AWS directory
    Init(commands::init::InitArgs),

    /// Manage the project stack
    #[command(subcommand)]
    Project(commands::project::ProjectCommand),

    /// Manage deployments
    #[command(subcommand)]
    Deployment(commands::deployment::DeploymentCommand),

    /// Manage resource groups
    #[command(subcommand, name = "resource-group")]
    ResourceGroup(commands::resource_group::ResourceGroupCommand),

    /// Manage resource-group parameter overrides
    #[command(subcommand)]
    Parameter(commands::parameter::ParameterCommand),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.log_level),
        )
        .try_init()
        .ok();

        let context = commands::Context::new(self.project_dir, self.user_dir, &self.color);
        match self.command {
            Commands::Init(args) => commands::init::execute(context, args),
            Commands::Project(command) => commands::project::execute(context, command),
            Commands::Deployment(command) => commands::deployment::execute(context, command),
            Commands::ResourceGroup(command) => commands::resource_group::execute(context, command),
            Commands::Parameter(command) => commands::parameter::execute(context, command),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
