//! # View Layer
//!
//! Commands never print directly; they report through a [`View`] so output
//! formatting stays in one place and the library can be driven headless.
//! [`ConsoleView`] is the terminal implementation, with color handling that
//! respects `NO_COLOR`, `CLICOLOR` and `TERM=dumb` alongside the `--color`
//! flag.
//!
//! The view also hosts the confirmation gate for stack operations: every
//! class of risk present in a pending-status map must be acknowledged,
//! either by its explicit `--confirm-*` flag or interactively at a
//! terminal. Declining, or running non-interactively without the flag, is a
//! hard stop before any side effect.

use std::collections::BTreeMap;
use std::env;

use console::style;
use dialoguer::Confirm;

use crate::error::{Error, Result};
use crate::pending::{required_confirmations, Confirmations, PendingAction, PendingResourceStatus};

/// Where command output and confirmation prompts go.
pub trait View {
    /// Reports a line of normal progress output.
    fn report(&self, message: &str);

    /// Reports a pending-status map, one line per resource.
    fn report_pending_status(&self, status: &BTreeMap<String, PendingResourceStatus>);

    /// The confirmation gate. Verifies every class of risk in `status` has
    /// been acknowledged; fails before any side effect otherwise.
    fn confirm_stack_operation(
        &self,
        stack_id: Option<&str>,
        description: &str,
        confirmations: &Confirmations,
        status: &BTreeMap<String, PendingResourceStatus>,
    ) -> Result<()>;
}

/// Terminal view.
#[derive(Debug, Clone)]
pub struct ConsoleView {
    use_color: bool,
    interactive: bool,
}

impl ConsoleView {
    /// Builds a view from the `--color` flag value and environment.
    ///
    /// In auto mode colors are disabled when `NO_COLOR` is set (any value),
    /// `CLICOLOR=0`, `TERM=dumb`, or stdout is not a terminal. Prompts are
    /// only offered when stdin is a terminal.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => detect_color_support(),
        };
        let interactive = console::user_attended();
        ConsoleView {
            use_color,
            interactive,
        }
    }

    /// A non-interactive view, used by tests and scripted callers. Only the
    /// explicit confirmation flags can satisfy the gate.
    pub fn non_interactive() -> Self {
        ConsoleView {
            use_color: false,
            interactive: false,
        }
    }

    fn action_label(&self, action: PendingAction) -> String {
        if !self.use_color {
            return action.to_string();
        }
        match action {
            PendingAction::Create => style(action).green().to_string(),
            PendingAction::Update => style(action).yellow().to_string(),
            PendingAction::Delete => style(action).red().to_string(),
        }
    }
}

fn detect_color_support() -> bool {
    // https://no-color.org/: presence alone disables colors.
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
        return false;
    }
    if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
        return true;
    }
    if env::var("TERM").is_ok_and(|v| v == "dumb") {
        return false;
    }
    console::Term::stdout().features().colors_supported()
}

impl View for ConsoleView {
    fn report(&self, message: &str) {
        println!("{}", message);
    }

    fn report_pending_status(&self, status: &BTreeMap<String, PendingResourceStatus>) {
        if status.is_empty() {
            self.report("No pending resource changes.");
            return;
        }
        for (name, entry) in status {
            let resource_type = entry
                .new_definition
                .as_ref()
                .or(entry.old_definition.as_ref())
                .map(|d| d.resource_type.as_str())
                .unwrap_or("");
            match entry.reason {
                Some(reason) => println!(
                    "  {:<10} {} ({}) - {}",
                    self.action_label(entry.action),
                    name,
                    resource_type,
                    reason
                ),
                None => println!(
                    "  {:<10} {} ({})",
                    self.action_label(entry.action),
                    name,
                    resource_type
                ),
            }
        }
    }

    fn confirm_stack_operation(
        &self,
        stack_id: Option<&str>,
        description: &str,
        confirmations: &Confirmations,
        status: &BTreeMap<String, PendingResourceStatus>,
    ) -> Result<()> {
        match stack_id {
            Some(stack_id) => self.report(&format!("{} ({})", description, stack_id)),
            None => self.report(description),
        }
        self.report_pending_status(status);

        let required = required_confirmations(status);
        if !self.interactive {
            return confirmations.check(&required);
        }

        // Interactively, each unacknowledged risk class gets its own prompt;
        // declining any one aborts before side effects.
        for class in required {
            let single = std::collections::BTreeSet::from([class]);
            if confirmations.check(&single).is_ok() {
                continue;
            }
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "This operation {}. Proceed?",
                    class.describe()
                ))
                .default(false)
                .interact()
                .map_err(|e| Error::usage(format!("Could not read confirmation: {}", e)))?;
            if !confirmed {
                return Err(Error::usage(format!(
                    "Operation cancelled. Pass {} to proceed without a prompt.",
                    class.flag()
                )));
            }
        }
        Ok(())
    }
}
