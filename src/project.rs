//! # Project Context
//!
//! One `Project` value is built per command invocation and carries every
//! piece of per-project state a command needs: the directory layout, the
//! local settings file, and the template aggregators for the project and
//! deployment tiers. Everything is constructed up front when the context is
//! built; nothing here is lazily initialized global state.
//!
//! The project's deployable state lives in three tiers of stacks:
//!
//! ```text
//! project stack
//! └── deployment stack (one per deployment)
//!     └── resource-group stack (one per enabled group, nested)
//! ```
//!
//! The project stack's id lives in the local settings; each deployment's
//! stack ids live in the remote settings fetched from the configuration
//! bucket named by the project stack's `Configuration` output.

use std::path::{Path, PathBuf};

use crate::aggregator::TemplateAggregator;
use crate::defaults;
use crate::error::{Error, Result};
use crate::provider::{ObjectStore, StackProvider};
use crate::settings::{CloudProjectSettings, LocalProjectSettings};
use crate::template::Template;

/// Name of the project stack output holding the configuration bucket.
pub const CONFIGURATION_OUTPUT_NAME: &str = "Configuration";

/// Per-invocation project context.
#[derive(Debug)]
pub struct Project {
    root_directory: PathBuf,
    user_directory: PathBuf,
    pub local_settings: LocalProjectSettings,
    project_templates: TemplateAggregator,
    deployment_templates: TemplateAggregator,
    deployment_access_templates: TemplateAggregator,
}

impl Project {
    /// Builds the context for the project rooted at `root_directory`.
    ///
    /// Does not require the project to be initialized; commands that need
    /// initialization check [`Project::ensure_initialized`] themselves.
    pub fn new(root_directory: PathBuf, user_directory: Option<PathBuf>) -> Self {
        let aws_directory = root_directory.join(defaults::AWS_DIRECTORY_NAME);
        let user_directory =
            user_directory.unwrap_or_else(|| defaults::default_user_directory(&root_directory));
        let local_settings = LocalProjectSettings::load(
            aws_directory.join(defaults::LOCAL_PROJECT_SETTINGS_FILENAME),
        );

        let aggregator = |base: &str, extension: &str| {
            TemplateAggregator::new(
                aws_directory.join(base),
                aws_directory.join(extension),
                root_directory.clone(),
            )
        };
        let project_templates = aggregator(
            defaults::PROJECT_TEMPLATE_FILENAME,
            defaults::PROJECT_TEMPLATE_EXTENSIONS_FILENAME,
        );
        let deployment_templates = aggregator(
            defaults::DEPLOYMENT_TEMPLATE_FILENAME,
            defaults::DEPLOYMENT_TEMPLATE_EXTENSIONS_FILENAME,
        );
        let deployment_access_templates = aggregator(
            defaults::DEPLOYMENT_ACCESS_TEMPLATE_FILENAME,
            defaults::DEPLOYMENT_ACCESS_TEMPLATE_EXTENSIONS_FILENAME,
        );

        Project {
            root_directory,
            user_directory,
            local_settings,
            project_templates,
            deployment_templates,
            deployment_access_templates,
        }
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    pub fn aws_directory(&self) -> PathBuf {
        self.root_directory.join(defaults::AWS_DIRECTORY_NAME)
    }

    pub fn user_directory(&self) -> &Path {
        &self.user_directory
    }

    pub fn project_templates(&mut self) -> &mut TemplateAggregator {
        &mut self.project_templates
    }

    pub fn deployment_templates(&mut self) -> &mut TemplateAggregator {
        &mut self.deployment_templates
    }

    pub fn deployment_access_templates(&mut self) -> &mut TemplateAggregator {
        &mut self.deployment_access_templates
    }

    /// True once the AWS directory and its settings file exist.
    pub fn is_initialized(&self) -> bool {
        self.local_settings.exists()
    }

    /// Fails with a usage error when the project has not been initialized.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::usage(format!(
                "The project at {} has not been initialized. Run the init command first.",
                self.root_directory.display()
            )));
        }
        Ok(())
    }

    /// Creates the AWS directory with starter project and deployment
    /// templates plus the local settings file.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::usage(format!(
                "The project at {} has already been initialized.",
                self.root_directory.display()
            )));
        }
        let aws_directory = self.aws_directory();
        starter_project_template()
            .save(&aws_directory.join(defaults::PROJECT_TEMPLATE_FILENAME))?;
        starter_deployment_template()
            .save(&aws_directory.join(defaults::DEPLOYMENT_TEMPLATE_FILENAME))?;
        starter_deployment_access_template()
            .save(&aws_directory.join(defaults::DEPLOYMENT_ACCESS_TEMPLATE_FILENAME))?;
        self.local_settings.save()?;
        log::info!("initialized project at {}", self.root_directory.display());
        Ok(())
    }

    /// The project stack's id. Requires the project stack to exist.
    pub fn project_stack_id(&self) -> Result<&str> {
        self.local_settings.project_stack_id().ok_or_else(|| {
            Error::config_with_hint(
                "The project stack has not been created.",
                "run the project create command first",
            )
        })
    }

    /// The configuration bucket named by the project stack's outputs.
    ///
    /// A project stack without that output has had its template altered by
    /// hand; this is a state error, not a usage error.
    pub fn configuration_bucket(&self, provider: &dyn StackProvider) -> Result<String> {
        let stack_id = self.project_stack_id()?;
        let description = provider.describe_stack(stack_id)?.ok_or_else(|| {
            Error::state(format!(
                "The project stack {} no longer exists.",
                stack_id
            ))
        })?;
        description
            .outputs
            .get(CONFIGURATION_OUTPUT_NAME)
            .cloned()
            .ok_or_else(|| {
                Error::state(format!(
                    "The project stack has no {} output. The {} resource may have been removed from the project template.",
                    CONFIGURATION_OUTPUT_NAME, CONFIGURATION_OUTPUT_NAME
                ))
            })
    }

    /// Loads the remote settings from the project's configuration bucket.
    pub fn cloud_settings(
        &self,
        provider: &dyn StackProvider,
        store: &dyn ObjectStore,
    ) -> Result<CloudProjectSettings> {
        let bucket = self.configuration_bucket(provider)?;
        Ok(CloudProjectSettings::load(store, &bucket))
    }

    /// Touches the refresh trigger so interactive tooling re-reads stack
    /// state. Failures are logged, never propagated: a refresh signal must
    /// not mask the error it often accompanies.
    pub fn signal_gui_refresh(&self) {
        let path = self
            .user_directory
            .join(defaults::GUI_REFRESH_TRIGGER_FILENAME);
        let result = std::fs::create_dir_all(&self.user_directory)
            .and_then(|_| std::fs::write(&path, b""));
        if let Err(error) = result {
            log::warn!("could not signal refresh at {}: {}", path.display(), error);
        }
    }
}

fn starter_project_template() -> Template {
    let mut template = Template::empty();
    template.resources.insert(
        "Configuration".to_string(),
        configuration_bucket_definition(),
    );
    template.outputs.insert(
        CONFIGURATION_OUTPUT_NAME.to_string(),
        crate::template::OutputDefinition {
            description: Some("Bucket holding project configuration data.".to_string()),
            value: serde_json::json!({ "Ref": "Configuration" }),
            extra: serde_json::Map::new(),
        },
    );
    template
}

fn configuration_bucket_definition() -> crate::template::ResourceDefinition {
    let mut definition = crate::template::ResourceDefinition::of_type("AWS::S3::Bucket");
    definition.properties.insert(
        "VersioningConfiguration".to_string(),
        serde_json::json!({ "Status": "Enabled" }),
    );
    definition
}

fn starter_deployment_template() -> Template {
    let mut template = Template::empty();
    for (name, description) in [
        ("ConfigurationBucket", "Bucket that contains configuration data."),
        (
            "ConfigurationKey",
            "Location in the configuration bucket of configuration data.",
        ),
        ("ProjectResourceHandler", "Handler for project custom resources."),
        ("DeploymentName", "The name of the deployment."),
    ] {
        template.parameters.insert(
            name.to_string(),
            crate::template::ParameterDefinition {
                parameter_type: Some("String".to_string()),
                description: Some(description.to_string()),
                ..Default::default()
            },
        );
    }
    template
}

fn starter_deployment_access_template() -> Template {
    let mut template = Template::empty();
    template.parameters.insert(
        "DeploymentName".to_string(),
        crate::template::ParameterDefinition {
            parameter_type: Some("String".to_string()),
            description: Some("The name of the deployment.".to_string()),
            ..Default::default()
        },
    );
    let mut player = crate::template::ResourceDefinition::of_type("AWS::IAM::Role");
    player.properties.insert(
        "AssumeRolePolicyDocument".to_string(),
        serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [ { "Effect": "Allow", "Action": "sts:AssumeRole",
                             "Principal": { "Federated": "cognito-identity.amazonaws.com" } } ]
        }),
    );
    player
        .properties
        .insert("Path".to_string(), serde_json::json!("/"));
    template.resources.insert("Player".to_string(), player);
    template
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::local::LocalStackProvider;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn project_in(temp: &TempDir) -> Project {
        Project::new(
            temp.path().join("game"),
            Some(temp.path().join("user")),
        )
    }

    #[test]
    fn test_uninitialized_project_is_detected() {
        let temp = TempDir::new().unwrap();
        let project = project_in(&temp);
        assert!(!project.is_initialized());
        assert!(project.ensure_initialized().is_err());
    }

    #[test]
    fn test_initialize_creates_layout() {
        let temp = TempDir::new().unwrap();
        let mut project = project_in(&temp);
        project.initialize().unwrap();

        assert!(project.is_initialized());
        project.ensure_initialized().unwrap();
        let aws = project.aws_directory();
        assert!(aws.join(defaults::PROJECT_TEMPLATE_FILENAME).is_file());
        assert!(aws.join(defaults::DEPLOYMENT_TEMPLATE_FILENAME).is_file());
        assert!(aws
            .join(defaults::DEPLOYMENT_ACCESS_TEMPLATE_FILENAME)
            .is_file());
        assert!(aws
            .join(defaults::LOCAL_PROJECT_SETTINGS_FILENAME)
            .is_file());
    }

    #[test]
    fn test_initialize_twice_fails() {
        let temp = TempDir::new().unwrap();
        let mut project = project_in(&temp);
        project.initialize().unwrap();
        assert!(project.initialize().is_err());
    }

    #[test]
    fn test_project_stack_id_requires_creation() {
        let temp = TempDir::new().unwrap();
        let project = project_in(&temp);
        let err = project.project_stack_id().unwrap_err();
        assert!(format!("{}", err).contains("has not been created"));
    }

    #[test]
    fn test_configuration_bucket_from_project_stack() {
        let temp = TempDir::new().unwrap();
        let mut project = project_in(&temp);
        project.initialize().unwrap();

        let provider = LocalStackProvider::new(temp.path().join("provider"));
        let stack_id = provider
            .create_stack("game", &starter_project_template(), &BTreeMap::new())
            .unwrap();
        project.local_settings.set_pending_project_stack_id(stack_id);
        project.local_settings.promote_pending_project_stack_id();

        let bucket = project.configuration_bucket(&provider).unwrap();
        assert_eq!(bucket, "game-Configuration");
    }

    #[test]
    fn test_missing_configuration_output_is_state_error() {
        let temp = TempDir::new().unwrap();
        let mut project = project_in(&temp);
        project.initialize().unwrap();

        let provider = LocalStackProvider::new(temp.path().join("provider"));
        let mut template = Template::empty();
        template.resources.insert(
            "Other".to_string(),
            crate::template::ResourceDefinition::of_type("AWS::S3::Bucket"),
        );
        let stack_id = provider
            .create_stack("game", &template, &BTreeMap::new())
            .unwrap();
        project.local_settings.set_pending_project_stack_id(stack_id);
        project.local_settings.promote_pending_project_stack_id();

        let err = project.configuration_bucket(&provider).unwrap_err();
        assert!(matches!(err, Error::State { .. }));
    }

    #[test]
    fn test_signal_gui_refresh_touches_trigger() {
        let temp = TempDir::new().unwrap();
        let project = project_in(&temp);
        project.signal_gui_refresh();
        assert!(temp
            .path()
            .join("user")
            .join(defaults::GUI_REFRESH_TRIGGER_FILENAME)
            .is_file());
    }
}
