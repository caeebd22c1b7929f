//! # Resource Group Command Implementation
//!
//! Adds, removes, lists and describes resource groups. `add` creates the
//! group directory with a starter template and enables it; `remove`
//! disables it, leaving the directory in place so its definitions are not
//! lost. Neither touches any stack: the next `deployment update` applies
//! the changed group list by patching the deployment template.

use anyhow::Result;
use clap::Subcommand;

use crate::commands::Context;
use stratus::resource_group;
use stratus::view::View;

#[derive(Subcommand, Debug)]
pub enum ResourceGroupCommand {
    /// Create a resource group and enable it
    Add {
        /// Name for the new resource group
        name: String,
    },

    /// Disable a resource group (its directory is kept)
    Remove {
        /// Name of the resource group to disable
        name: String,
    },

    /// List resource groups and whether they are enabled
    List,

    /// Show a group's pending resource changes for a deployment
    Describe {
        /// Name of the resource group
        name: String,

        /// Deployment to diff against
        #[arg(long, value_name = "NAME")]
        deployment: String,
    },
}

/// Execute a `resource-group` subcommand.
pub fn execute(mut context: Context, command: ResourceGroupCommand) -> Result<()> {
    context.project.ensure_initialized()?;
    match command {
        ResourceGroupCommand::Add { name } => {
            resource_group::ResourceGroup::create(&context.project.aws_directory(), &name)?;
            context.project.local_settings.enable_resource_group(&name);
            context.project.local_settings.save()?;
            context.view.report(&format!(
                "Resource group {} added. Run `stratus deployment update` to apply it.",
                name
            ));
        }
        ResourceGroupCommand::Remove { name } => {
            resource_group::find_resource_group(&context.project.aws_directory(), &name)?;
            let was_enabled = context
                .project
                .local_settings
                .disable_resource_group(&name);
            context.project.local_settings.save()?;
            if was_enabled {
                context.view.report(&format!(
                    "Resource group {} disabled. Its directory is kept; run `stratus deployment update` to remove its stack.",
                    name
                ));
            } else {
                context
                    .view
                    .report(&format!("Resource group {} was not enabled.", name));
            }
        }
        ResourceGroupCommand::List => {
            let groups = resource_group::list_resource_groups(&context.project.aws_directory())?;
            if groups.is_empty() {
                context.view.report("No resource groups are defined.");
                return Ok(());
            }
            for group in groups {
                let enabled = context
                    .project
                    .local_settings
                    .enabled_resource_groups()
                    .iter()
                    .any(|n| n == group.name());
                let state = if enabled { "enabled" } else { "disabled" };
                context
                    .view
                    .report(&format!("{:<24} {}", group.name(), state));
            }
        }
        ResourceGroupCommand::Describe { name, deployment } => {
            let mut group =
                resource_group::find_resource_group(&context.project.aws_directory(), &name)?;
            let (orchestrator, project) = context.split(Default::default());
            let status = orchestrator.resource_group_status(project, &deployment, &mut group)?;
            context.view.report(&format!(
                "Pending changes for {} in deployment {}:",
                name, deployment
            ));
            context.view.report_pending_status(&status);
        }
    }
    Ok(())
}
