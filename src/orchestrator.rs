//! # Stack Orchestrator
//!
//! Sequences create, update and delete across the three-tier stack
//! hierarchy. Each operation follows the same shape: resolve the stack's
//! identity, compute the pending-status map, pass the confirmation gate,
//! upload artifacts, run the before hook, wait out the upload-consistency
//! delay, issue exactly one provider call, then run the after hook and
//! bookkeeping.
//!
//! Two rules hold everywhere:
//!
//! - **Nested stacks are never driven directly.** A resource group is added
//!   to or removed from a deployment by recomputing the deployment
//!   template's nested-stack resources and updating the *deployment* stack.
//!   Operating on the nested stack itself would side-step sibling groups'
//!   own pending changes during a deployment-level apply.
//! - **Provider errors propagate unchanged.** There is no retry loop here;
//!   the only thing done on the way out is forcing a UI refresh signal so
//!   interactive tooling reflects a partially-applied change.
//!
//! All offline-computable validation (name formats, merge conflicts,
//! unknown deployments) happens before the first provider call.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::aggregator;
use crate::defaults;
use crate::error::{Error, Result};
use crate::pending::{self, ChangeInput, Confirmations, PendingResourceStatus};
use crate::project::Project;
use crate::provider::{ContentUploader, ObjectStore, StackProvider};
use crate::resource_group::{self, ResourceGroup};
use crate::settings::CloudProjectSettings;
use crate::template::Template;
use crate::util;
use crate::view::View;

/// Context handed to hooks around a deployment update.
#[derive(Debug)]
pub struct HookContext<'a> {
    pub deployment_name: &'a str,
    pub stack_id: Option<&'a str>,
}

/// Fixed extension points around a stack update. Downstream code generation
/// or cache refresh steps run here without the orchestrator knowing their
/// content.
pub trait Hooks {
    fn before_update(&self, _context: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _context: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// The no-op hook set.
pub struct NoHooks;

impl Hooks for NoHooks {}

/// Drives stack operations against the collaborator interfaces.
pub struct Orchestrator<'a> {
    provider: &'a dyn StackProvider,
    uploader: &'a dyn ContentUploader,
    store: &'a dyn ObjectStore,
    view: &'a dyn View,
    hooks: &'a dyn Hooks,
    confirmations: Confirmations,
    update_delay: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        provider: &'a dyn StackProvider,
        uploader: &'a dyn ContentUploader,
        store: &'a dyn ObjectStore,
        view: &'a dyn View,
        hooks: &'a dyn Hooks,
        confirmations: Confirmations,
    ) -> Self {
        Orchestrator {
            provider,
            uploader,
            store,
            view,
            hooks,
            confirmations,
            update_delay: defaults::STACK_UPDATE_DELAY,
        }
    }

    /// Overrides the upload-consistency delay. Tests use a zero delay; the
    /// default stays in place for real providers.
    pub fn with_update_delay(mut self, delay: Duration) -> Self {
        self.update_delay = delay;
        self
    }

    fn wait_for_upload_consistency(&self) {
        if !self.update_delay.is_zero() {
            log::debug!(
                "waiting {:?} for uploaded content to become readable",
                self.update_delay
            );
            std::thread::sleep(self.update_delay);
        }
    }

    /// Issues a stack update, forcing a UI refresh signal before re-raising
    /// any provider error. Never swallows the error itself.
    fn update_stack_with_refresh(
        &self,
        project: &Project,
        stack_id: &str,
        template: &Template,
        parameters: &BTreeMap<String, String>,
    ) -> Result<()> {
        let result = self.provider.update_stack(stack_id, template, parameters);
        if result.is_err() {
            project.signal_gui_refresh();
        }
        result
    }

    fn project_stack_name(&self, project: &Project) -> Result<String> {
        let name = project
            .root_directory()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::usage(format!(
                    "Cannot derive a stack name from the project directory {}.",
                    project.root_directory().display()
                ))
            })?;
        util::validate_stack_name(&name)?;
        Ok(name)
    }

    fn cloud_settings(&self, project: &Project) -> Result<CloudProjectSettings> {
        project.cloud_settings(self.provider, self.store)
    }

    /// Creates the project stack and the initial remote settings.
    pub fn create_project_stack(&self, project: &mut Project) -> Result<String> {
        project.ensure_initialized()?;
        if project.local_settings.project_stack_id().is_some() {
            return Err(Error::usage("The project stack has already been created."));
        }
        if let Some(pending) = project.local_settings.pending_project_stack_id() {
            return Err(Error::state(format!(
                "A previous project stack create was interrupted; {} still records \
                 PendingProjectStackId {}. Delete that stack, or promote the id to \
                 ProjectStackId, before creating the project stack again.",
                project.local_settings.path().display(),
                pending
            )));
        }
        let name = self.project_stack_name(project)?;
        let template = project.project_templates().effective_template()?.clone();

        let status = creation_status(&template);
        self.view.confirm_stack_operation(
            None,
            "Creating project stack.",
            &self.confirmations,
            &status,
        )?;

        self.upload_template(&format!("project/{}", defaults::PROJECT_TEMPLATE_FILENAME), &template)?;
        self.wait_for_upload_consistency();

        let stack_id = self
            .provider
            .create_stack(&name, &template, &BTreeMap::new())?;

        // Two-phase: record the id as pending first, so an interrupted run
        // leaves evidence rather than an orphaned stack.
        project
            .local_settings
            .set_pending_project_stack_id(stack_id.clone());
        project.local_settings.save()?;
        project.local_settings.promote_pending_project_stack_id();
        project.local_settings.save()?;

        let bucket = project.configuration_bucket(self.provider)?;
        CloudProjectSettings::initial(&bucket).save(self.store)?;

        project.signal_gui_refresh();
        self.view
            .report(&format!("Project stack {} created.", stack_id));
        Ok(stack_id)
    }

    /// Deletes the project stack. All deployments must be deleted first.
    pub fn delete_project_stack(&self, project: &mut Project) -> Result<()> {
        let stack_id = project.project_stack_id()?.to_string();

        let settings = self.cloud_settings(project)?;
        let remaining = settings.settings.deployment_names();
        if !remaining.is_empty() {
            return Err(Error::usage(format!(
                "The project has deployments that must be deleted first: {}.",
                remaining.join(", ")
            )));
        }

        let template = self.provider.get_current_template(&stack_id)?;
        let status = deletion_status(&template);
        self.view.confirm_stack_operation(
            Some(&stack_id),
            "Deleting project stack.",
            &self.confirmations,
            &status,
        )?;

        self.provider.delete_stack(&stack_id)?;
        project.local_settings.clear_project_stack_id();
        project.local_settings.save()?;
        project.signal_gui_refresh();
        self.view.report("Project stack deleted.");
        Ok(())
    }

    /// Creates a deployment: its stack, its access stack, and the settings
    /// entry, committed with the two-phase pending-id pattern.
    pub fn create_deployment(&self, project: &mut Project, deployment_name: &str) -> Result<()> {
        util::validate_stack_name(deployment_name)?;
        let project_name = self.project_stack_name(project)?;
        project.project_stack_id()?;

        let mut settings = self.cloud_settings(project)?;
        if settings
            .settings
            .deployment(deployment_name)
            .is_some_and(|d| d.stack_id.is_some() || d.pending_stack_id.is_some())
        {
            return Err(Error::usage(format!(
                "The {} deployment already exists.",
                deployment_name
            )));
        }

        let template = self.render_deployment_template(project)?;
        let access_template = project
            .deployment_access_templates()
            .effective_template()?
            .clone();
        let parameters = self.deployment_parameters(project, deployment_name)?;

        let mut status = creation_status(&template);
        status.extend(creation_status(&access_template));
        self.view.confirm_stack_operation(
            None,
            &format!("Creating deployment {}.", deployment_name),
            &self.confirmations,
            &status,
        )?;

        self.upload_deployment_artifacts(project, deployment_name)?;
        self.wait_for_upload_consistency();
        let stack_name = format!("{}-{}", project_name, deployment_name);
        let stack_id = self
            .provider
            .create_stack(&stack_name, &template, &parameters)?;
        settings
            .settings
            .set_pending_deployment_stack_id(deployment_name, stack_id);
        settings.save(self.store)?;

        let access_stack_name = format!("{}-{}-Access", project_name, deployment_name);
        let mut access_parameters = BTreeMap::new();
        access_parameters.insert("DeploymentName".to_string(), deployment_name.to_string());
        let access_stack_id =
            self.provider
                .create_stack(&access_stack_name, &access_template, &access_parameters)?;
        settings
            .settings
            .set_pending_deployment_access_stack_id(deployment_name, access_stack_id);
        settings.save(self.store)?;

        settings
            .settings
            .finalize_deployment_stack_ids(deployment_name)?;
        if settings.settings.default_deployment.is_none() {
            settings.settings.default_deployment = Some(deployment_name.to_string());
        }
        settings.save(self.store)?;

        project.signal_gui_refresh();
        self.view
            .report(&format!("Deployment {} created.", deployment_name));
        Ok(())
    }

    /// Updates a deployment stack to match the current templates and the
    /// enabled resource-group list. This is also how resource groups are
    /// created and deleted at the stack level: the deployment template is
    /// recomputed and the deployment stack updated, never a nested stack.
    pub fn update_deployment(&self, project: &mut Project, deployment_name: &str) -> Result<()> {
        let settings = self.cloud_settings(project)?;
        let stack_id = deployment_stack_id(&settings, deployment_name)?;

        let description = self.provider.describe_stack(&stack_id)?.ok_or_else(|| {
            Error::state(format!(
                "The {} deployment's stack {} no longer exists.",
                deployment_name, stack_id
            ))
        })?;
        let old_template = self.provider.get_current_template(&stack_id)?;
        let new_template = self.render_deployment_template(project)?;
        let parameters = self.deployment_parameters(project, deployment_name)?;
        let content_paths = self.aggregate_content_paths(project)?;

        let status = pending::resolve_pending_status(&ChangeInput {
            old_template: &old_template,
            new_template: &new_template,
            old_parameter_values: &description.parameters,
            new_parameter_values: &parameters,
            content_paths: &content_paths,
            stack_last_updated: description.last_updated,
        });
        self.view.confirm_stack_operation(
            Some(&stack_id),
            &format!("Updating deployment {}.", deployment_name),
            &self.confirmations,
            &status,
        )?;

        let context = HookContext {
            deployment_name,
            stack_id: Some(&stack_id),
        };
        self.hooks.before_update(&context)?;

        self.upload_deployment_artifacts(project, deployment_name)?;
        self.wait_for_upload_consistency();
        self.update_stack_with_refresh(project, &stack_id, &new_template, &parameters)?;

        self.hooks.after_update(&context)?;
        project.signal_gui_refresh();
        self.view
            .report(&format!("Deployment {} updated.", deployment_name));
        Ok(())
    }

    /// Deletes a deployment: its access stack, its stack, and its settings
    /// entry.
    pub fn delete_deployment(&self, project: &mut Project, deployment_name: &str) -> Result<()> {
        let mut settings = self.cloud_settings(project)?;
        let deployment = settings
            .settings
            .deployment(deployment_name)
            .cloned()
            .ok_or_else(|| unknown_deployment(deployment_name))?;
        if deployment.protected && !self.confirmations.resource_deletion {
            return Err(Error::usage(format!(
                "The {} deployment is protected. Pass --confirm-resource-deletion to delete it.",
                deployment_name
            )));
        }
        let stack_id = deployment_stack_id(&settings, deployment_name)?;

        let template = self.provider.get_current_template(&stack_id)?;
        let status = deletion_status(&template);
        self.view.confirm_stack_operation(
            Some(&stack_id),
            &format!("Deleting deployment {}.", deployment_name),
            &self.confirmations,
            &status,
        )?;

        if let Some(access_stack_id) = &deployment.access_stack_id {
            self.provider.delete_stack(access_stack_id)?;
        }
        self.provider.delete_stack(&stack_id)?;

        settings.settings.remove_deployment(deployment_name);
        if settings.settings.default_deployment.as_deref() == Some(deployment_name) {
            settings.settings.default_deployment = None;
        }
        settings.save(self.store)?;

        project.signal_gui_refresh();
        self.view
            .report(&format!("Deployment {} deleted.", deployment_name));
        Ok(())
    }

    /// The pending-status map for one resource group under a deployment, as
    /// shown by the describe command.
    pub fn resource_group_status(
        &self,
        project: &mut Project,
        deployment_name: &str,
        group: &mut ResourceGroup,
    ) -> Result<BTreeMap<String, PendingResourceStatus>> {
        let settings = self.cloud_settings(project)?;
        if settings.settings.deployment(deployment_name).is_none() {
            return Err(unknown_deployment(deployment_name));
        }
        let nested_stack_id = self.nested_stack_id(&settings, deployment_name, group.name())?;
        group.pending_resource_status(
            self.provider,
            &settings.settings,
            deployment_name,
            nested_stack_id.as_deref(),
        )
    }

    /// The physical id of a group's nested stack under a deployment, if the
    /// deployment stack has a resource for the group.
    fn nested_stack_id(
        &self,
        settings: &CloudProjectSettings,
        deployment_name: &str,
        group_name: &str,
    ) -> Result<Option<String>> {
        let stack_id = match settings
            .settings
            .deployment(deployment_name)
            .and_then(|d| d.stack_id.as_ref())
        {
            Some(stack_id) => stack_id.clone(),
            None => return Ok(None),
        };
        let resources = self.provider.describe_stack_resources(&stack_id)?;
        let physical_id = resources
            .into_iter()
            .find(|r| r.logical_id == group_name)
            .and_then(|r| r.physical_id);
        // A physical id the provider cannot describe means the nested stack
        // has not materialized yet; the group then diffs against nothing.
        match physical_id {
            Some(id) => Ok(self.provider.describe_stack(&id)?.map(|d| d.stack_id)),
            None => Ok(None),
        }
    }

    /// Renders the effective deployment template for the currently enabled
    /// resource groups.
    fn render_deployment_template(&self, project: &mut Project) -> Result<Template> {
        let group_names: Vec<String> = project
            .local_settings
            .enabled_resource_groups()
            .to_vec();
        for name in &group_names {
            resource_group::find_resource_group(&project.aws_directory(), name)?;
        }
        aggregator::deployment_effective_template(project.deployment_templates(), &group_names)
    }

    /// Uploads the rendered deployment template and every enabled group's
    /// template, returning the rendered deployment template.
    fn upload_deployment_artifacts(
        &self,
        project: &mut Project,
        deployment_name: &str,
    ) -> Result<Template> {
        let template = self.render_deployment_template(project)?;
        self.upload_template(
            &format!("{}/{}", deployment_name, defaults::DEPLOYMENT_TEMPLATE_FILENAME),
            &template,
        )?;

        let group_names = project.local_settings.enabled_resource_groups().to_vec();
        for name in &group_names {
            let mut group = resource_group::find_resource_group(&project.aws_directory(), name)?;
            let settings = self.cloud_settings(project)?;
            let group_template =
                group.template_with_parameters(&settings.settings, Some(deployment_name))?;
            self.upload_template(
                &format!(
                    "{}/{}/{}",
                    deployment_name,
                    name,
                    defaults::RESOURCE_GROUP_TEMPLATE_FILENAME
                ),
                &group_template,
            )?;

            // API resources reference their definition file by key.
            let swagger_path = group.directory().join(defaults::SWAGGER_FILENAME);
            if swagger_path.is_file() {
                self.uploader.upload_file(
                    &format!("{}/{}/{}", deployment_name, name, defaults::SWAGGER_FILENAME),
                    &swagger_path,
                )?;
            }

            // Function resources reference their code by key.
            for (resource_type, paths) in group.content_paths()? {
                if resource_type != "AWS::Lambda::Function" {
                    continue;
                }
                for path in paths {
                    if path.is_dir() {
                        self.uploader.upload_directory(
                            &format!(
                                "{}/{}/{}",
                                deployment_name,
                                name,
                                defaults::LAMBDA_CODE_DIRECTORY_NAME
                            ),
                            &path,
                        )?;
                    }
                }
            }
        }
        Ok(template)
    }

    fn upload_template(&self, key: &str, template: &Template) -> Result<()> {
        let body = serde_json::to_vec_pretty(template)?;
        self.uploader.upload_content(key, &body)?;
        Ok(())
    }

    /// The parameter values a deployment stack is created or updated with.
    fn deployment_parameters(
        &self,
        project: &Project,
        deployment_name: &str,
    ) -> Result<BTreeMap<String, String>> {
        let bucket = project.configuration_bucket(self.provider)?;
        let mut parameters = BTreeMap::new();
        parameters.insert("ConfigurationBucket".to_string(), bucket);
        parameters.insert(
            "ConfigurationKey".to_string(),
            deployment_name.to_string(),
        );
        parameters.insert("DeploymentName".to_string(), deployment_name.to_string());
        parameters.insert(
            "ProjectResourceHandler".to_string(),
            project.project_stack_id()?.to_string(),
        );
        Ok(parameters)
    }

    /// Content paths across all enabled groups, merged per resource type,
    /// feeding deployment-level change detection.
    fn aggregate_content_paths(
        &self,
        project: &Project,
    ) -> Result<BTreeMap<String, Vec<std::path::PathBuf>>> {
        let mut merged: BTreeMap<String, Vec<std::path::PathBuf>> = BTreeMap::new();
        let group_names = project.local_settings.enabled_resource_groups().to_vec();
        for name in &group_names {
            let mut group = resource_group::find_resource_group(&project.aws_directory(), name)?;
            for (resource_type, paths) in group.content_paths()? {
                let entry = merged.entry(resource_type).or_default();
                for path in paths {
                    if !entry.contains(&path) {
                        entry.push(path);
                    }
                }
            }
        }
        Ok(merged)
    }
}

fn unknown_deployment(deployment_name: &str) -> Error {
    Error::usage(format!(
        "The {} deployment does not exist.",
        deployment_name
    ))
}

fn deployment_stack_id(
    settings: &CloudProjectSettings,
    deployment_name: &str,
) -> Result<String> {
    let deployment = settings
        .settings
        .deployment(deployment_name)
        .ok_or_else(|| unknown_deployment(deployment_name))?;
    deployment.stack_id.clone().ok_or_else(|| {
        Error::state(format!(
            "The {} deployment has no stack id. A previous create may have been interrupted.",
            deployment_name
        ))
    })
}

/// The pending-status map for creating every resource in a template.
fn creation_status(template: &Template) -> BTreeMap<String, PendingResourceStatus> {
    let empty = Template::empty();
    pending::resolve_pending_status(&ChangeInput {
        old_template: &empty,
        new_template: template,
        old_parameter_values: &BTreeMap::new(),
        new_parameter_values: &BTreeMap::new(),
        content_paths: &BTreeMap::new(),
        stack_last_updated: SystemTime::now(),
    })
}

/// The pending-status map for deleting every resource in a template.
fn deletion_status(template: &Template) -> BTreeMap<String, PendingResourceStatus> {
    let empty = Template::empty();
    pending::resolve_pending_status(&ChangeInput {
        old_template: template,
        new_template: &empty,
        old_parameter_values: &BTreeMap::new(),
        new_parameter_values: &BTreeMap::new(),
        content_paths: &BTreeMap::new(),
        stack_last_updated: SystemTime::now(),
    })
}
