//! # Stack Provider Abstraction
//!
//! The seams between the orchestration engine and the infrastructure it
//! drives. Everything that talks to the outside world goes through one of
//! three traits:
//!
//! - **`StackProvider`**: create, update, delete and describe stacks. The
//!   engine never calls a nested stack's lifecycle directly; nested stacks
//!   are only ever changed by updating their parent's template.
//! - **`ContentUploader`**: put template bodies and resource content where
//!   the provider can reach them, returning the key the template can
//!   reference.
//! - **`ObjectStore`**: simple whole-object get/put for settings documents.
//!
//! The in-tree [`local`] implementations back these with plain directories,
//! which is what the integration tests and offline use run against.

pub mod local;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::template::Template;

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    UpdateInProgress,
    UpdateComplete,
    DeleteInProgress,
    DeleteComplete,
    RollbackComplete,
    Failed,
}

impl StackStatus {
    /// True when the stack exists and can be operated on.
    pub fn is_operable(self) -> bool {
        matches!(
            self,
            StackStatus::CreateComplete
                | StackStatus::UpdateComplete
                | StackStatus::RollbackComplete
        )
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::RollbackComplete => "ROLLBACK_COMPLETE",
            StackStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One resource within a described stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub logical_id: String,
    pub physical_id: Option<String>,
    pub resource_type: String,
    pub status: String,
}

/// A described stack: identity, state, and current inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_id: String,
    pub name: String,
    pub status: StackStatus,
    /// The parameter values the stack was last created or updated with.
    pub parameters: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub last_updated: SystemTime,
}

/// Stack lifecycle operations.
pub trait StackProvider {
    /// Creates a stack and returns its id. Returns once the create has
    /// completed or failed, not when it is merely accepted.
    fn create_stack(
        &self,
        name: &str,
        template: &Template,
        parameters: &BTreeMap<String, String>,
    ) -> Result<String>;

    /// Updates an existing stack with a new template and parameters.
    fn update_stack(
        &self,
        stack_id: &str,
        template: &Template,
        parameters: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Deletes a stack. Tolerates a stack that is already gone.
    fn delete_stack(&self, stack_id: &str) -> Result<()>;

    /// Describes a stack, or `None` when it does not exist.
    fn describe_stack(&self, stack_id: &str) -> Result<Option<StackDescription>>;

    /// Lists the resources of an existing stack.
    fn describe_stack_resources(&self, stack_id: &str) -> Result<Vec<ResourceDescription>>;

    /// The template the stack currently has, as last created or updated.
    fn get_current_template(&self, stack_id: &str) -> Result<Template>;
}

/// Uploads template bodies and resource content for the provider to consume.
pub trait ContentUploader {
    /// Uploads raw content under `key` and returns the key the template can
    /// reference it by.
    fn upload_content(&self, key: &str, content: &[u8]) -> Result<String>;

    /// Uploads a local file under `key`.
    fn upload_file(&self, key: &str, path: &std::path::Path) -> Result<String>;

    /// Uploads every file under `directory` beneath `key_prefix`, keyed by
    /// its path relative to the directory. Function-code directories are
    /// shipped this way. Returns the uploaded keys.
    fn upload_directory(&self, key_prefix: &str, directory: &std::path::Path)
        -> Result<Vec<String>>;
}

/// Whole-object storage for settings documents.
pub trait ObjectStore {
    /// Fetches an object's body, or `None` when it does not exist.
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes an object, replacing any previous body.
    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operable_statuses() {
        assert!(StackStatus::CreateComplete.is_operable());
        assert!(StackStatus::UpdateComplete.is_operable());
        assert!(StackStatus::RollbackComplete.is_operable());
        assert!(!StackStatus::DeleteComplete.is_operable());
        assert!(!StackStatus::CreateInProgress.is_operable());
    }

    #[test]
    fn test_status_display_matches_wire_form() {
        assert_eq!(StackStatus::UpdateComplete.to_string(), "UPDATE_COMPLETE");
        assert_eq!(StackStatus::Failed.to_string(), "FAILED");
    }
}
