//! # Change Detector
//!
//! Classifies every resource in a planned stack update as pending create,
//! update, or delete by diffing the candidate template, its parameter
//! values, and its on-disk content against what the stack currently has.
//! The result is a transient map computed fresh on every planning pass and
//! never persisted.
//!
//! ## Key Components
//!
//! - **`resolve_pending_status`**: the diff itself. A resource present only
//!   in the candidate is a pending create; present only in the deployed
//!   template, a pending delete; present in both with a differing
//!   definition, differing stack parameters, or newer associated content,
//!   a pending update.
//! - **`Confirmations`** / [`required_confirmations`]: the manual safety
//!   gate. Each class of risk in the pending map (usage cost, security
//!   change, data deletion) demands its own explicit flag; a missing flag
//!   is a usage error, never a silent skip.
//!
//! Content change detection is deliberately coarse: content paths are
//! registered per resource *type*, so newer code under any one function's
//! directory marks every resource of that type pending. Known limitation,
//! kept because finer granularity needs per-resource build metadata the
//! template does not carry.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::template::{ResourceDefinition, Template};

/// Reason string attached to every pending create.
pub const PENDING_CREATE_REASON: &str =
    "Resource is defined in the local template but does not exist in the stack.";

/// Reason string attached to every pending delete.
pub const PENDING_DELETE_REASON: &str =
    "Resource exists in the stack but is not defined in the local template.";

/// What will happen to one resource when the update is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PendingAction::Create => "CREATE",
            PendingAction::Update => "UPDATE",
            PendingAction::Delete => "DELETE",
        })
    }
}

/// One entry in the pending-status map. Unchanged resources are not
/// reported at all.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResourceStatus {
    pub old_definition: Option<ResourceDefinition>,
    pub new_definition: Option<ResourceDefinition>,
    pub action: PendingAction,
    pub reason: Option<&'static str>,
}

/// Everything the resolver compares.
#[derive(Debug)]
pub struct ChangeInput<'a> {
    /// The template the stack was last created or updated with.
    pub old_template: &'a Template,
    /// The candidate template.
    pub new_template: &'a Template,
    pub old_parameter_values: &'a BTreeMap<String, String>,
    pub new_parameter_values: &'a BTreeMap<String, String>,
    /// Resource type → paths whose modification times feed change
    /// detection for resources of that type.
    pub content_paths: &'a BTreeMap<String, Vec<PathBuf>>,
    /// When the stack was last created or updated.
    pub stack_last_updated: SystemTime,
}

/// Diffs old against new and reports every resource that is not unchanged.
pub fn resolve_pending_status(input: &ChangeInput<'_>) -> BTreeMap<String, PendingResourceStatus> {
    // Any parameter-value difference invalidates the whole stack: parameter
    // references can appear anywhere in a template, so per-resource
    // attribution of a parameter change is not possible from the diff alone.
    let parameters_changed = input.old_parameter_values != input.new_parameter_values;
    let changed_types = changed_content_types(input.content_paths, input.stack_last_updated);

    let mut names: BTreeSet<&String> = input.old_template.resources.keys().collect();
    names.extend(input.new_template.resources.keys());

    let mut status = BTreeMap::new();
    for name in names {
        let old = input.old_template.resources.get(name);
        let new = input.new_template.resources.get(name);
        let entry = match (old, new) {
            (None, Some(new)) => PendingResourceStatus {
                old_definition: None,
                new_definition: Some(new.clone()),
                action: PendingAction::Create,
                reason: Some(PENDING_CREATE_REASON),
            },
            (Some(old), None) => PendingResourceStatus {
                old_definition: Some(old.clone()),
                new_definition: None,
                action: PendingAction::Delete,
                reason: Some(PENDING_DELETE_REASON),
            },
            (Some(old), Some(new)) => {
                let content_changed = changed_types.contains(&new.resource_type);
                if old == new && !parameters_changed && !content_changed {
                    continue;
                }
                PendingResourceStatus {
                    old_definition: Some(old.clone()),
                    new_definition: Some(new.clone()),
                    action: PendingAction::Update,
                    reason: None,
                }
            }
            (None, None) => continue,
        };
        status.insert(name.clone(), entry);
    }
    status
}

/// The set of resource types whose registered content is newer than the
/// stack's last update. A directory path counts as changed if any file
/// under it is newer.
fn changed_content_types(
    content_paths: &BTreeMap<String, Vec<PathBuf>>,
    since: SystemTime,
) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (resource_type, paths) in content_paths {
        if paths.iter().any(|path| content_newer_than(path, since)) {
            log::debug!("content for {} resources has changed", resource_type);
            changed.insert(resource_type.clone());
        }
    }
    changed
}

fn content_newer_than(path: &PathBuf, since: SystemTime) -> bool {
    if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .any(|entry| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(|modified| modified > since)
                    .unwrap_or(false)
            })
    } else {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|modified| modified > since)
            .unwrap_or(false)
    }
}

/// One class of risk a pending operation can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskClass {
    /// Creating resources that may incur usage cost.
    AwsUsage,
    /// Changing security-sensitive resources (roles, permissions).
    SecurityChange,
    /// Deleting resources, and with them any data they hold.
    ResourceDeletion,
}

impl RiskClass {
    /// The CLI flag that acknowledges this class of risk.
    pub fn flag(self) -> &'static str {
        match self {
            RiskClass::AwsUsage => "--confirm-aws-usage",
            RiskClass::SecurityChange => "--confirm-security-change",
            RiskClass::ResourceDeletion => "--confirm-resource-deletion",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            RiskClass::AwsUsage => "creates resources that may incur usage charges",
            RiskClass::SecurityChange => "changes security-related resources",
            RiskClass::ResourceDeletion => "deletes resources and any data they contain",
        }
    }
}

/// True when a resource's definition touches security configuration.
fn is_security_sensitive(name: &str, definition: &ResourceDefinition) -> bool {
    if name == crate::template::ACCESS_CONTROL_RESOURCE_NAME {
        return true;
    }
    if definition.resource_type.starts_with("AWS::IAM::") {
        return true;
    }
    definition.framework_metadata("Permissions").is_some()
        || definition.framework_metadata("RoleMappings").is_some()
}

/// The risk classes present in a pending-status map, each of which must be
/// acknowledged before the operation runs.
pub fn required_confirmations(
    status: &BTreeMap<String, PendingResourceStatus>,
) -> BTreeSet<RiskClass> {
    let mut required = BTreeSet::new();
    for (name, entry) in status {
        match entry.action {
            PendingAction::Create => {
                required.insert(RiskClass::AwsUsage);
            }
            PendingAction::Delete => {
                required.insert(RiskClass::ResourceDeletion);
            }
            PendingAction::Update => {}
        }
        let sensitive = entry
            .new_definition
            .as_ref()
            .or(entry.old_definition.as_ref())
            .map(|definition| is_security_sensitive(name, definition))
            .unwrap_or(false);
        if sensitive {
            required.insert(RiskClass::SecurityChange);
        }
    }
    required
}

/// The confirmation flags the caller actually passed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Confirmations {
    pub aws_usage: bool,
    pub security_change: bool,
    pub resource_deletion: bool,
}

impl Confirmations {
    fn covers(&self, class: RiskClass) -> bool {
        match class {
            RiskClass::AwsUsage => self.aws_usage,
            RiskClass::SecurityChange => self.security_change,
            RiskClass::ResourceDeletion => self.resource_deletion,
        }
    }

    /// Verifies every required risk class has been acknowledged. The first
    /// missing flag is a usage error naming the flag to pass.
    pub fn check(&self, required: &BTreeSet<RiskClass>) -> Result<()> {
        for class in required {
            if !self.covers(*class) {
                return Err(Error::usage(format!(
                    "This operation {}. Pass {} to proceed.",
                    class.describe(),
                    class.flag()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn template_from(resources: serde_json::Value) -> Template {
        serde_json::from_value(json!({ "Resources": resources })).unwrap()
    }

    fn input<'a>(
        old: &'a Template,
        new: &'a Template,
        old_params: &'a BTreeMap<String, String>,
        new_params: &'a BTreeMap<String, String>,
        content: &'a BTreeMap<String, Vec<PathBuf>>,
    ) -> ChangeInput<'a> {
        ChangeInput {
            old_template: old,
            new_template: new,
            old_parameter_values: old_params,
            new_parameter_values: new_params,
            content_paths: content,
            stack_last_updated: SystemTime::now(),
        }
    }

    #[test]
    fn test_create_and_delete_classification() {
        let old = template_from(json!({ "A": { "Type": "X" } }));
        let new = template_from(json!({ "B": { "Type": "Y" } }));
        let params = BTreeMap::new();
        let content = BTreeMap::new();

        let status = resolve_pending_status(&input(&old, &new, &params, &params, &content));

        assert_eq!(status["A"].action, PendingAction::Delete);
        assert_eq!(status["A"].reason, Some(PENDING_DELETE_REASON));
        assert_eq!(status["B"].action, PendingAction::Create);
        assert_eq!(status["B"].reason, Some(PENDING_CREATE_REASON));
    }

    #[test]
    fn test_unchanged_resource_not_reported() {
        let template = template_from(json!({ "A": { "Type": "X" } }));
        let params = BTreeMap::new();
        let content = BTreeMap::new();
        let status =
            resolve_pending_status(&input(&template, &template, &params, &params, &content));
        assert!(status.is_empty());
    }

    #[test]
    fn test_definition_change_is_pending_update() {
        let old = template_from(json!({ "A": { "Type": "X" } }));
        let new = template_from(json!({ "A": { "Type": "X", "Properties": { "K": 1 } } }));
        let params = BTreeMap::new();
        let content = BTreeMap::new();

        let status = resolve_pending_status(&input(&old, &new, &params, &params, &content));
        assert_eq!(status["A"].action, PendingAction::Update);
        assert_eq!(status["A"].reason, None);
    }

    #[test]
    fn test_parameter_change_marks_all_shared_resources() {
        let template = template_from(json!({ "A": { "Type": "X" }, "B": { "Type": "Y" } }));
        let old_params = BTreeMap::new();
        let mut new_params = BTreeMap::new();
        new_params.insert("Size".to_string(), "large".to_string());
        let content = BTreeMap::new();

        let status = resolve_pending_status(&input(
            &template, &template, &old_params, &new_params, &content,
        ));
        assert_eq!(status["A"].action, PendingAction::Update);
        assert_eq!(status["B"].action, PendingAction::Update);
    }

    #[test]
    fn test_newer_content_marks_all_resources_of_type() {
        let temp = tempfile::TempDir::new().unwrap();
        let code = temp.path().join("code");
        std::fs::create_dir_all(&code).unwrap();
        std::fs::write(code.join("main.py"), "pass").unwrap();

        let template = template_from(json!({
            "FnA": { "Type": "AWS::Lambda::Function" },
            "FnB": { "Type": "AWS::Lambda::Function" },
            "Bucket": { "Type": "AWS::S3::Bucket" }
        }));
        let params = BTreeMap::new();
        let mut content = BTreeMap::new();
        content.insert("AWS::Lambda::Function".to_string(), vec![code]);

        let mut input = input(&template, &template, &params, &params, &content);
        // Stack last updated before the code file was written.
        input.stack_last_updated = SystemTime::now() - Duration::from_secs(3600);

        let status = resolve_pending_status(&input);
        assert_eq!(status["FnA"].action, PendingAction::Update);
        assert_eq!(status["FnB"].action, PendingAction::Update);
        assert!(!status.contains_key("Bucket"));
    }

    #[test]
    fn test_missing_content_path_is_not_a_change() {
        let template = template_from(json!({ "Fn": { "Type": "AWS::Lambda::Function" } }));
        let params = BTreeMap::new();
        let mut content = BTreeMap::new();
        content.insert(
            "AWS::Lambda::Function".to_string(),
            vec![PathBuf::from("/nonexistent/code")],
        );

        let status = resolve_pending_status(&input(&template, &template, &params, &params, &content));
        assert!(status.is_empty());
    }

    #[test]
    fn test_required_confirmations_per_risk_class() {
        let old = template_from(json!({
            "Gone": { "Type": "AWS::S3::Bucket" },
            "Role": { "Type": "AWS::IAM::Role" }
        }));
        let new = template_from(json!({
            "Role": { "Type": "AWS::IAM::Role", "Properties": { "Path": "/" } },
            "Fresh": { "Type": "AWS::SQS::Queue" }
        }));
        let params = BTreeMap::new();
        let content = BTreeMap::new();

        let status = resolve_pending_status(&input(&old, &new, &params, &params, &content));
        let required = required_confirmations(&status);

        assert!(required.contains(&RiskClass::AwsUsage));
        assert!(required.contains(&RiskClass::SecurityChange));
        assert!(required.contains(&RiskClass::ResourceDeletion));
    }

    #[test]
    fn test_metadata_permissions_are_security_sensitive() {
        let old = template_from(json!({}));
        let new = template_from(json!({
            "Api": {
                "Type": "Custom::ServiceApi",
                "Metadata": { "CloudCanvas": { "Permissions": [] } }
            }
        }));
        let params = BTreeMap::new();
        let content = BTreeMap::new();

        let status = resolve_pending_status(&input(&old, &new, &params, &params, &content));
        let required = required_confirmations(&status);
        assert!(required.contains(&RiskClass::SecurityChange));
    }

    #[test]
    fn test_missing_confirmation_is_usage_error() {
        let mut required = BTreeSet::new();
        required.insert(RiskClass::ResourceDeletion);

        let err = Confirmations::default().check(&required).unwrap_err();
        assert!(format!("{}", err).contains("--confirm-resource-deletion"));

        let confirmations = Confirmations {
            resource_deletion: true,
            ..Confirmations::default()
        };
        confirmations.check(&required).unwrap();
    }
}
