//! # Parameter Command Implementation
//!
//! Lists, sets and clears per-deployment parameter overrides for a resource
//! group. Values live in the remote settings tree; a value set for the `*`
//! deployment applies to every deployment that has no explicit value of its
//! own, and a parameter with no override falls back to the template's
//! `Default`. List shows the resolved value and which layer supplied it.

use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;

use crate::commands::Context;
use stratus::resource_group;
use stratus::settings::DEFAULT_ENTRY_KEY;
use stratus::util;
use stratus::view::View;

#[derive(Subcommand, Debug)]
pub enum ParameterCommand {
    /// Show a group's parameters and their resolved values
    List {
        /// Name of the resource group
        group: String,

        /// Deployment to resolve values for
        #[arg(long, value_name = "NAME")]
        deployment: String,
    },

    /// Set a parameter override
    Set {
        /// Name of the resource group
        group: String,

        /// Deployment the override applies to; use `*` for all deployments
        #[arg(long, value_name = "NAME")]
        deployment: String,

        /// Parameter name
        name: String,

        /// Parameter value (parsed as JSON, falling back to a string)
        value: String,
    },

    /// Clear a parameter override
    Clear {
        /// Name of the resource group
        group: String,

        /// Deployment the override applies to; use `*` for all deployments
        #[arg(long, value_name = "NAME")]
        deployment: String,

        /// Parameter name
        name: String,
    },
}

/// Execute a `parameter` subcommand.
pub fn execute(context: Context, command: ParameterCommand) -> Result<()> {
    context.project.ensure_initialized()?;
    match command {
        ParameterCommand::List { group, deployment } => list(context, &group, &deployment),
        ParameterCommand::Set {
            group,
            deployment,
            name,
            value,
        } => set(context, &group, &deployment, &name, value),
        ParameterCommand::Clear {
            group,
            deployment,
            name,
        } => clear(context, &group, &deployment, &name),
    }
}

fn list(context: Context, group_name: &str, deployment_name: &str) -> Result<()> {
    let mut group =
        resource_group::find_resource_group(&context.project.aws_directory(), group_name)?;
    // Parse the local template before touching the provider: offline
    // validation failures must not depend on stack state.
    let template = group.template()?.clone();
    let settings = context
        .project
        .cloud_settings(&context.provider, &context.store)?;
    if template.parameters.is_empty() {
        context.view.report(&format!(
            "The {} resource group's template defines no parameters.",
            group_name
        ));
        return Ok(());
    }
    for (name, definition) in &template.parameters {
        let (value, origin) = match settings
            .settings
            .resolve_parameter(deployment_name, group_name, name)
        {
            Some(value) => {
                let origin = if settings
                    .settings
                    .deployment(deployment_name)
                    .and_then(|d| d.resource_groups.get(group_name))
                    .and_then(|g| g.parameters.get(name))
                    .is_some()
                {
                    deployment_name
                } else {
                    DEFAULT_ENTRY_KEY
                };
                (util::parameter_value_string(value), origin)
            }
            None => match &definition.default {
                Some(default) => (util::parameter_value_string(default), "template"),
                None => ("<unset>".to_string(), "template"),
            },
        };
        context
            .view
            .report(&format!("{:<24} {:<24} from {}", name, value, origin));
    }
    Ok(())
}

fn set(
    context: Context,
    group_name: &str,
    deployment_name: &str,
    name: &str,
    raw_value: String,
) -> Result<()> {
    resource_group::find_resource_group(&context.project.aws_directory(), group_name)?;
    let mut settings = context
        .project
        .cloud_settings(&context.provider, &context.store)?;

    let value: Value = serde_json::from_str(&raw_value).unwrap_or(Value::String(raw_value));
    settings
        .settings
        .deployment_mut(deployment_name)
        .resource_groups
        .entry(group_name.to_string())
        .or_default()
        .parameters
        .insert(name.to_string(), value);
    settings.save(&context.store)?;

    context.view.report(&format!(
        "Parameter {} set for {} in deployment {}. Run `stratus deployment update` to apply it.",
        name, group_name, deployment_name
    ));
    Ok(())
}

fn clear(context: Context, group_name: &str, deployment_name: &str, name: &str) -> Result<()> {
    let mut settings = context
        .project
        .cloud_settings(&context.provider, &context.store)?;

    let removed = settings
        .settings
        .deployment_mut(deployment_name)
        .resource_groups
        .get_mut(group_name)
        .and_then(|group| group.parameters.remove(name))
        .is_some();
    if !removed {
        context.view.report(&format!(
            "No {} override was set for {} in deployment {}.",
            name, group_name, deployment_name
        ));
        return Ok(());
    }
    settings.save(&context.store)?;
    context.view.report(&format!(
        "Parameter {} cleared for {} in deployment {}.",
        name, group_name, deployment_name
    ));
    Ok(())
}
