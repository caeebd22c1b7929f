//! # Project Command Implementation
//!
//! Creates and deletes the project stack, the root of the three-tier stack
//! hierarchy. The project stack owns the configuration bucket that carries
//! uploaded templates and the remote settings document, so it must exist
//! before any deployment can be created and can only be deleted after every
//! deployment is gone.

use anyhow::Result;
use clap::Subcommand;

use crate::commands::{ConfirmationArgs, Context};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create the project stack
    Create {
        #[command(flatten)]
        confirmations: ConfirmationArgs,
    },

    /// Delete the project stack
    Delete {
        #[command(flatten)]
        confirmations: ConfirmationArgs,
    },
}

/// Execute a `project` subcommand.
pub fn execute(mut context: Context, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Create { confirmations } => {
            let (orchestrator, project) = context.split(confirmations.into());
            orchestrator.create_project_stack(project)?;
        }
        ProjectCommand::Delete { confirmations } => {
            let (orchestrator, project) = context.split(confirmations.into());
            orchestrator.delete_project_stack(project)?;
        }
    }
    Ok(())
}
