//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `stratus` command-line tool. Each subcommand is defined in its own file
//! to keep the logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct (or subcommand enum) defining the command-specific
//!   arguments, derived using `clap`.
//! - An `execute` function that takes the shared [`Context`] plus the
//!   parsed arguments and performs the command's logic by calling into the
//!   `stratus` library.
//!
//! The [`Context`] bundles the project, the provider collaborators and the
//! view; commands never talk to the filesystem layout or the provider
//! directly.

pub mod completions;
pub mod deployment;
pub mod init;
pub mod parameter;
pub mod project;
pub mod resource_group;

use std::path::PathBuf;

use clap::Args;

use stratus::orchestrator::{NoHooks, Orchestrator};
use stratus::pending::Confirmations;
use stratus::project::Project;
use stratus::provider::local::{DirObjectStore, DirUploader, LocalStackProvider};
use stratus::view::ConsoleView;

/// Shared per-invocation state for all commands.
pub struct Context {
    pub project: Project,
    pub provider: LocalStackProvider,
    pub uploader: DirUploader,
    pub store: DirObjectStore,
    pub view: ConsoleView,
}

impl Context {
    /// Builds the context from the global CLI options. Provider state lives
    /// under the per-user directory, so project directories stay free of
    /// generated stack records.
    pub fn new(project_dir: PathBuf, user_dir: Option<PathBuf>, color_flag: &str) -> Self {
        let project = Project::new(project_dir, user_dir);
        let user_directory = project.user_directory().to_path_buf();
        Context {
            project,
            provider: LocalStackProvider::new(user_directory.clone()),
            uploader: DirUploader::new(user_directory.clone()),
            store: DirObjectStore::new(user_directory),
            view: ConsoleView::from_env_and_flag(color_flag),
        }
    }

    /// Splits the context into an orchestrator over its collaborators and a
    /// mutable borrow of the project. The split is field-disjoint, so both
    /// can be used together.
    pub fn split(&mut self, confirmations: Confirmations) -> (Orchestrator<'_>, &mut Project) {
        let orchestrator = Orchestrator::new(
            &self.provider,
            &self.uploader,
            &self.store,
            &self.view,
            &NO_HOOKS,
            confirmations,
        );
        (orchestrator, &mut self.project)
    }
}

static NO_HOOKS: NoHooks = NoHooks;

/// The explicit acknowledgement flags for risky stack operations.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ConfirmationArgs {
    /// Acknowledge that this operation may create resources that incur
    /// usage charges
    #[arg(long)]
    pub confirm_aws_usage: bool,

    /// Acknowledge that this operation changes security-related resources
    #[arg(long)]
    pub confirm_security_change: bool,

    /// Acknowledge that this operation deletes resources and their data
    #[arg(long)]
    pub confirm_resource_deletion: bool,
}

impl From<ConfirmationArgs> for Confirmations {
    fn from(args: ConfirmationArgs) -> Self {
        Confirmations {
            aws_usage: args.confirm_aws_usage,
            security_change: args.confirm_security_change,
            resource_deletion: args.confirm_resource_deletion,
        }
    }
}
