//! # Init Command Implementation
//!
//! Creates the project's AWS directory: starter project, deployment and
//! deployment-access templates plus the local settings file. Running it
//! twice is an error; the directory holds hand-edited state.

use anyhow::Result;
use clap::Args;

use crate::commands::Context;
use stratus::view::View;

/// Initialize the project's AWS directory
#[derive(Args, Debug)]
pub struct InitArgs {}

/// Execute the `init` command.
pub fn execute(mut context: Context, _args: InitArgs) -> Result<()> {
    context.project.initialize()?;
    context.view.report(&format!(
        "Initialized project at {}.",
        context.project.root_directory().display()
    ));
    context
        .view
        .report("Run `stratus project create` to create the project stack.");
    Ok(())
}
