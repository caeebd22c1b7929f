//! # Deployment Command Implementation
//!
//! Creates, updates, deletes and lists deployments. A deployment is one
//! complete instance of the project's enabled resource groups: its stack
//! carries a nested stack per group plus the paired configuration
//! resources, and an access stack alongside. `update` re-renders the
//! deployment template from the current templates and enabled-group list
//! and applies it, which is also how resource-group enables and disables
//! reach the stack level.

use anyhow::Result;
use clap::Subcommand;

use crate::commands::{ConfirmationArgs, Context};
use stratus::view::View;

#[derive(Subcommand, Debug)]
pub enum DeploymentCommand {
    /// Create a deployment and its access stack
    Create {
        /// Name for the new deployment
        name: String,

        #[command(flatten)]
        confirmations: ConfirmationArgs,
    },

    /// Update a deployment's stack to match the local templates
    Update {
        /// Name of the deployment to update
        name: String,

        #[command(flatten)]
        confirmations: ConfirmationArgs,
    },

    /// Delete a deployment, its access stack, and its settings
    Delete {
        /// Name of the deployment to delete
        name: String,

        #[command(flatten)]
        confirmations: ConfirmationArgs,
    },

    /// List the project's deployments
    List,
}

/// Execute a `deployment` subcommand.
pub fn execute(mut context: Context, command: DeploymentCommand) -> Result<()> {
    match command {
        DeploymentCommand::Create {
            name,
            confirmations,
        } => {
            let (orchestrator, project) = context.split(confirmations.into());
            orchestrator.create_deployment(project, &name)?;
        }
        DeploymentCommand::Update {
            name,
            confirmations,
        } => {
            let (orchestrator, project) = context.split(confirmations.into());
            orchestrator.update_deployment(project, &name)?;
        }
        DeploymentCommand::Delete {
            name,
            confirmations,
        } => {
            let (orchestrator, project) = context.split(confirmations.into());
            orchestrator.delete_deployment(project, &name)?;
        }
        DeploymentCommand::List => list(context)?,
    }
    Ok(())
}

fn list(context: Context) -> Result<()> {
    context.project.ensure_initialized()?;
    let settings = context
        .project
        .cloud_settings(&context.provider, &context.store)?;

    let names = settings.settings.deployment_names();
    if names.is_empty() {
        context.view.report("No deployments have been created.");
        return Ok(());
    }
    let default = settings.settings.default_deployment.as_deref();
    for name in names {
        let deployment = settings.settings.deployment(&name);
        let mut line = format!("{}", name);
        if Some(name.as_str()) == default {
            line.push_str(" (default)");
        }
        if deployment.is_some_and(|d| d.protected) {
            line.push_str(" (protected)");
        }
        if deployment.is_some_and(|d| d.pending_stack_id.is_some()) {
            line.push_str(" (create incomplete)");
        }
        context.view.report(&line);
    }
    Ok(())
}
