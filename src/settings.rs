//! # Settings Store
//!
//! Hierarchical deployment settings, persisted in two places:
//!
//! - **`LocalProjectSettings`**: a JSON file under the project's AWS
//!   directory, created on initialization. Holds the project stack id, its
//!   pending counterpart, and the enabled resource-group list. Loading is
//!   lenient: an unreadable-but-present file sets a load-error flag instead
//!   of failing, so a later save cannot silently destroy the user's file.
//!
//! - **`CloudProjectSettings`**: a JSON object in the project's
//!   configuration bucket, created lazily once the project stack exists.
//!   Holds the deployment tree: `deployment name → resource-group name →
//!   parameter values` plus per-deployment stack ids. Every save PUTs the
//!   whole document (last-writer-wins), so mutations always go through the
//!   one in-memory instance.
//!
//! Both are explicit typed structures with a serde boundary rather than
//! free-form maps, so shape drift is caught at deserialization time. A
//! special `"*"` deployment or resource-group key carries defaults applied
//! to all concrete entries.
//!
//! ## Two-phase stack-id commit
//!
//! Creating a deployment records `PendingDeploymentStackId` and
//! `PendingDeploymentAccessStackId` before the owning operation completes;
//! [`ProjectSettings::finalize_deployment_stack_ids`] promotes both to their
//! final fields only when both are present. An interrupted run leaves the
//! pending fields behind, letting a subsequent run detect and retry rather
//! than silently duplicating stacks. The project stack id follows the same
//! pattern in the local settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::defaults;
use crate::error::{Error, Result};
use crate::provider::ObjectStore;
use crate::util;

/// Key naming the defaults entry applied to all deployments or groups.
pub const DEFAULT_ENTRY_KEY: &str = "*";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-resource-group settings within one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceGroupSettings {
    /// Parameter value overrides, by parameter name.
    #[serde(rename = "parameter", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-deployment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeploymentSettings {
    #[serde(
        rename = "DeploymentStackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stack_id: Option<String>,

    #[serde(
        rename = "DeploymentAccessStackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access_stack_id: Option<String>,

    #[serde(
        rename = "PendingDeploymentStackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pending_stack_id: Option<String>,

    #[serde(
        rename = "PendingDeploymentAccessStackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pending_access_stack_id: Option<String>,

    /// Protected deployments require extra confirmation for destructive
    /// operations.
    #[serde(rename = "Protected", default, skip_serializing_if = "is_false")]
    pub protected: bool,

    #[serde(
        rename = "resource-group",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub resource_groups: BTreeMap<String, ResourceGroupSettings>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The project-wide settings tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectSettings {
    #[serde(
        rename = "DefaultDeployment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_deployment: Option<String>,

    #[serde(
        rename = "ReleaseDeployment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub release_deployment: Option<String>,

    #[serde(rename = "deployment", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, DeploymentSettings>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectSettings {
    /// The initial settings written when the project stack is first created.
    pub fn initial() -> Self {
        let mut deployments = BTreeMap::new();
        let mut default_entry = DeploymentSettings::default();
        default_entry
            .resource_groups
            .insert(DEFAULT_ENTRY_KEY.to_string(), ResourceGroupSettings::default());
        deployments.insert(DEFAULT_ENTRY_KEY.to_string(), default_entry);
        ProjectSettings {
            deployments,
            ..ProjectSettings::default()
        }
    }

    /// All concrete deployment names, excluding the `"*"` defaults entry.
    pub fn deployment_names(&self) -> Vec<String> {
        self.deployments
            .keys()
            .filter(|name| *name != DEFAULT_ENTRY_KEY)
            .cloned()
            .collect()
    }

    /// Looks up a deployment's settings. Unknown names are tolerated.
    pub fn deployment(&self, name: &str) -> Option<&DeploymentSettings> {
        self.deployments.get(name)
    }

    /// Ensures a deployment entry exists and returns it mutably.
    pub fn deployment_mut(&mut self, name: &str) -> &mut DeploymentSettings {
        self.deployments.entry(name.to_string()).or_default()
    }

    /// Removes a deployment entry, tolerating unknown names.
    pub fn remove_deployment(&mut self, name: &str) {
        self.deployments.remove(name);
    }

    /// The resource-group settings map for a deployment, when present.
    pub fn resource_group_settings(
        &self,
        deployment_name: &str,
    ) -> Option<&BTreeMap<String, ResourceGroupSettings>> {
        self.deployment(deployment_name).map(|d| &d.resource_groups)
    }

    /// The `"*"` defaults resource-group settings.
    pub fn default_resource_group_settings(
        &self,
    ) -> Option<&BTreeMap<String, ResourceGroupSettings>> {
        self.resource_group_settings(DEFAULT_ENTRY_KEY)
    }

    /// Resolves a parameter value for a group under a deployment using the
    /// two settings layers: the explicit per-deployment value, then the
    /// `"*"` defaults entry. Template defaults are the caller's third layer.
    pub fn resolve_parameter(
        &self,
        deployment_name: &str,
        group_name: &str,
        parameter_name: &str,
    ) -> Option<&Value> {
        fn lookup<'a>(
            settings: Option<&'a BTreeMap<String, ResourceGroupSettings>>,
            group_name: &str,
            parameter_name: &str,
        ) -> Option<&'a Value> {
            settings?
                .get(group_name)?
                .parameters
                .get(parameter_name)
        }
        lookup(
            self.resource_group_settings(deployment_name),
            group_name,
            parameter_name,
        )
        .or_else(|| {
            lookup(
                self.default_resource_group_settings(),
                group_name,
                parameter_name,
            )
        })
    }

    /// Records the pending deployment stack id (two-phase commit, phase one).
    pub fn set_pending_deployment_stack_id(&mut self, deployment_name: &str, stack_id: String) {
        self.deployment_mut(deployment_name).pending_stack_id = Some(stack_id);
    }

    /// Records the pending deployment access stack id.
    pub fn set_pending_deployment_access_stack_id(
        &mut self,
        deployment_name: &str,
        stack_id: String,
    ) {
        self.deployment_mut(deployment_name).pending_access_stack_id = Some(stack_id);
    }

    /// Promotes both pending stack ids to their final fields (phase two).
    ///
    /// Fails with no mutation when either pending field is absent: that
    /// means the deployment was never fully created, and finalizing it
    /// would record stacks that may not exist.
    pub fn finalize_deployment_stack_ids(&mut self, deployment_name: &str) -> Result<()> {
        let deployment = self.deployments.get(deployment_name).ok_or_else(|| {
            Error::state(format!(
                "There is no {} deployment to finalize.",
                deployment_name
            ))
        })?;
        if deployment.pending_stack_id.is_none() {
            return Err(Error::state(
                "There is no PendingDeploymentStackId property.",
            ));
        }
        if deployment.pending_access_stack_id.is_none() {
            return Err(Error::state(
                "There is no PendingDeploymentAccessStackId property.",
            ));
        }

        let deployment = self.deployment_mut(deployment_name);
        deployment.stack_id = deployment.pending_stack_id.take();
        deployment.access_stack_id = deployment.pending_access_stack_id.take();
        Ok(())
    }
}

/// The local settings document serialized to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct LocalSettingsDocument {
    #[serde(
        rename = "ProjectStackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    project_stack_id: Option<String>,

    #[serde(
        rename = "PendingProjectStackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pending_project_stack_id: Option<String>,

    #[serde(rename = "EnabledResourceGroups", default)]
    enabled_resource_groups: Vec<String>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Project settings persisted to the local filesystem.
#[derive(Debug)]
pub struct LocalProjectSettings {
    path: PathBuf,
    load_error: bool,
    document: LocalSettingsDocument,
}

impl LocalProjectSettings {
    /// Loads the settings file at `path`.
    ///
    /// A missing file yields empty settings. A present-but-unreadable file
    /// sets the load-error flag instead of failing, so the command can still
    /// run read-only operations; any attempted save then fails loudly
    /// rather than overwriting a file the user may want to repair.
    pub fn load(path: PathBuf) -> Self {
        match util::load_json::<LocalSettingsDocument>(&path, false) {
            Ok(document) => LocalProjectSettings {
                path,
                load_error: false,
                document: document.unwrap_or_default(),
            },
            Err(error) => {
                log::warn!("could not load {}: {}", path.display(), error);
                LocalProjectSettings {
                    path,
                    load_error: true,
                    document: LocalSettingsDocument::default(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the settings file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn project_stack_id(&self) -> Option<&str> {
        self.document.project_stack_id.as_deref()
    }

    pub fn pending_project_stack_id(&self) -> Option<&str> {
        self.document.pending_project_stack_id.as_deref()
    }

    /// Records the pending project stack id (two-phase commit, phase one).
    pub fn set_pending_project_stack_id(&mut self, stack_id: String) {
        self.document.pending_project_stack_id = Some(stack_id);
    }

    /// Promotes a pending project stack id to the final field. A no-op when
    /// there is no pending id.
    pub fn promote_pending_project_stack_id(&mut self) {
        if let Some(stack_id) = self.document.pending_project_stack_id.take() {
            self.document.project_stack_id = Some(stack_id);
        }
    }

    /// Forgets the project stack id, e.g. after the project stack has been
    /// deleted.
    pub fn clear_project_stack_id(&mut self) {
        self.document.project_stack_id = None;
    }

    pub fn enabled_resource_groups(&self) -> &[String] {
        &self.document.enabled_resource_groups
    }

    /// Adds a group to the enabled list. Returns true if it was added.
    pub fn enable_resource_group(&mut self, name: &str) -> bool {
        if self
            .document
            .enabled_resource_groups
            .iter()
            .any(|n| n == name)
        {
            return false;
        }
        self.document.enabled_resource_groups.push(name.to_string());
        true
    }

    /// Removes a group from the enabled list. Returns true if it was there.
    pub fn disable_resource_group(&mut self, name: &str) -> bool {
        let before = self.document.enabled_resource_groups.len();
        self.document.enabled_resource_groups.retain(|n| n != name);
        self.document.enabled_resource_groups.len() != before
    }

    /// Saves the settings file, creating the parent directory first.
    ///
    /// Fails when the load-error flag is set: the file on disk exists but
    /// could not be parsed, and overwriting it would destroy whatever the
    /// user had there.
    pub fn save(&self) -> Result<()> {
        if self.load_error {
            return Err(Error::config_with_hint(
                format!(
                    "{} was not loaded correctly and will not be overwritten.",
                    self.path.display()
                ),
                "make sure that it is a valid JSON document",
            ));
        }
        util::save_json(&self.path, &self.document)
    }
}

/// Project settings persisted to the configuration bucket.
#[derive(Debug)]
pub struct CloudProjectSettings {
    bucket: String,
    key: String,
    pub settings: ProjectSettings,
}

impl CloudProjectSettings {
    /// Fetches the settings object from the store.
    ///
    /// Any fetch failure, including "object does not exist", yields an empty
    /// tree: that is how a freshly created project looks before its first
    /// settings save.
    pub fn load(store: &dyn ObjectStore, bucket: &str) -> Self {
        let key = defaults::PROJECT_SETTINGS_FILENAME;
        let settings = match store.get_object(bucket, key) {
            Ok(Some(body)) => match serde_json::from_slice(&body) {
                Ok(settings) => settings,
                Err(error) => {
                    log::warn!("could not parse {}/{}: {}", bucket, key, error);
                    ProjectSettings::default()
                }
            },
            Ok(None) => {
                log::debug!("no settings object at {}/{}", bucket, key);
                ProjectSettings::default()
            }
            Err(error) => {
                log::warn!("could not fetch {}/{}: {}", bucket, key, error);
                ProjectSettings::default()
            }
        };
        CloudProjectSettings {
            bucket: bucket.to_string(),
            key: key.to_string(),
            settings,
        }
    }

    /// Creates the initial settings for a just-created project stack.
    pub fn initial(bucket: &str) -> Self {
        CloudProjectSettings {
            bucket: bucket.to_string(),
            key: defaults::PROJECT_SETTINGS_FILENAME.to_string(),
            settings: ProjectSettings::initial(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Saves the whole document back to the store. Last writer wins; the
    /// caller must have mutated this one in-memory instance.
    pub fn save(&self, store: &dyn ObjectStore) -> Result<()> {
        let body = serde_json::to_vec_pretty(&self.settings)?;
        store.put_object(&self.bucket, &self.key, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::local::DirObjectStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings_with_parameter_layers(
        concrete: Option<&str>,
        default_entry: Option<&str>,
    ) -> ProjectSettings {
        let mut settings = ProjectSettings::default();
        if let Some(value) = concrete {
            settings
                .deployment_mut("dev")
                .resource_groups
                .entry("widgets".to_string())
                .or_default()
                .parameters
                .insert("Size".to_string(), json!(value));
        }
        if let Some(value) = default_entry {
            settings
                .deployment_mut(DEFAULT_ENTRY_KEY)
                .resource_groups
                .entry("widgets".to_string())
                .or_default()
                .parameters
                .insert("Size".to_string(), json!(value));
        }
        settings
    }

    #[test]
    fn test_resolve_parameter_prefers_concrete_deployment() {
        let settings = settings_with_parameter_layers(Some("v1"), Some("v2"));
        assert_eq!(
            settings.resolve_parameter("dev", "widgets", "Size"),
            Some(&json!("v1"))
        );
    }

    #[test]
    fn test_resolve_parameter_falls_back_to_default_entry() {
        let settings = settings_with_parameter_layers(None, Some("v2"));
        assert_eq!(
            settings.resolve_parameter("dev", "widgets", "Size"),
            Some(&json!("v2"))
        );
    }

    #[test]
    fn test_resolve_parameter_none_when_no_layer() {
        let settings = settings_with_parameter_layers(None, None);
        assert_eq!(settings.resolve_parameter("dev", "widgets", "Size"), None);
    }

    #[test]
    fn test_deployment_names_exclude_defaults_entry() {
        let mut settings = ProjectSettings::initial();
        settings.deployment_mut("dev");
        settings.deployment_mut("prod");
        assert_eq!(settings.deployment_names(), vec!["dev", "prod"]);
    }

    #[test]
    fn test_unknown_deployment_is_tolerated() {
        let settings = ProjectSettings::default();
        assert!(settings.deployment("nope").is_none());
        assert!(settings.resource_group_settings("nope").is_none());
    }

    #[test]
    fn test_finalize_requires_both_pending_ids() {
        let mut settings = ProjectSettings::default();
        settings.set_pending_deployment_stack_id("dev", "arn:stack".into());

        let err = settings.finalize_deployment_stack_ids("dev").unwrap_err();
        assert!(format!("{}", err).contains("PendingDeploymentAccessStackId"));

        // No mutation happened.
        let deployment = settings.deployment("dev").unwrap();
        assert_eq!(deployment.pending_stack_id.as_deref(), Some("arn:stack"));
        assert!(deployment.stack_id.is_none());
    }

    #[test]
    fn test_finalize_promotes_both_ids() {
        let mut settings = ProjectSettings::default();
        settings.set_pending_deployment_stack_id("dev", "arn:stack".into());
        settings.set_pending_deployment_access_stack_id("dev", "arn:access".into());

        settings.finalize_deployment_stack_ids("dev").unwrap();

        let deployment = settings.deployment("dev").unwrap();
        assert_eq!(deployment.stack_id.as_deref(), Some("arn:stack"));
        assert_eq!(deployment.access_stack_id.as_deref(), Some("arn:access"));
        assert!(deployment.pending_stack_id.is_none());
        assert!(deployment.pending_access_stack_id.is_none());
    }

    #[test]
    fn test_finalize_unknown_deployment_fails() {
        let mut settings = ProjectSettings::default();
        assert!(settings.finalize_deployment_stack_ids("dev").is_err());
    }

    #[test]
    fn test_local_settings_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("aws/local-project-settings.json");

        let mut settings = LocalProjectSettings::load(path.clone());
        settings.enable_resource_group("widgets");
        settings.set_pending_project_stack_id("arn:pending".into());
        settings.save().unwrap();

        let reloaded = LocalProjectSettings::load(path);
        assert_eq!(reloaded.enabled_resource_groups(), ["widgets"]);
        assert_eq!(reloaded.pending_project_stack_id(), Some("arn:pending"));
        assert_eq!(reloaded.project_stack_id(), None);
    }

    #[test]
    fn test_local_settings_promote_pending_project_stack_id() {
        let temp = TempDir::new().unwrap();
        let mut settings =
            LocalProjectSettings::load(temp.path().join("local-project-settings.json"));
        settings.set_pending_project_stack_id("arn:project".into());
        settings.promote_pending_project_stack_id();
        assert_eq!(settings.project_stack_id(), Some("arn:project"));
        assert_eq!(settings.pending_project_stack_id(), None);
    }

    #[test]
    fn test_local_settings_load_error_blocks_save() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("local-project-settings.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let settings = LocalProjectSettings::load(path.clone());
        let err = settings.save().unwrap_err();
        assert!(format!("{}", err).contains("will not be overwritten"));

        // The unreadable file is untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not valid json");
    }

    #[test]
    fn test_local_settings_preserves_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("local-project-settings.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "ProjectStackId": "arn:project",
                "CustomKey": { "nested": true }
            }))
            .unwrap(),
        )
        .unwrap();

        let settings = LocalProjectSettings::load(path.clone());
        settings.save().unwrap();

        let reread: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread["CustomKey"], json!({ "nested": true }));
    }

    #[test]
    fn test_cloud_settings_missing_object_yields_empty_tree() {
        let temp = TempDir::new().unwrap();
        let store = DirObjectStore::new(temp.path().to_path_buf());
        let settings = CloudProjectSettings::load(&store, "config-bucket");
        assert!(settings.settings.deployments.is_empty());
    }

    #[test]
    fn test_cloud_settings_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let store = DirObjectStore::new(temp.path().to_path_buf());

        let mut settings = CloudProjectSettings::initial("config-bucket");
        settings
            .settings
            .set_pending_deployment_stack_id("dev", "arn:stack".into());
        settings.save(&store).unwrap();

        let reloaded = CloudProjectSettings::load(&store, "config-bucket");
        assert_eq!(
            reloaded
                .settings
                .deployment("dev")
                .unwrap()
                .pending_stack_id
                .as_deref(),
            Some("arn:stack")
        );
        // The "*" defaults entry from the initial content survived.
        assert!(reloaded.settings.deployments.contains_key(DEFAULT_ENTRY_KEY));
    }
}
