//! # Resource Group Model
//!
//! A resource group is one independently deployable bundle of resources: a
//! directory holding a `resource-template.json` plus any content those
//! resources need (function code, API definitions). Each group becomes a
//! nested stack under a deployment.
//!
//! This module owns the group's template and its structural edits. Edits
//! keep the dependency graph consistent: removing a resource scrubs it from
//! every other resource's `DependsOn`, and adding a resource that carries
//! permission metadata wires it under the `AccessControl` resource so
//! access control is always applied after the resources it governs. Every
//! edit reports whether the template actually changed, letting callers skip
//! needless saves and uploads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::defaults;
use crate::error::{Error, Result};
use crate::pending::{self, ChangeInput, PendingResourceStatus};
use crate::provider::StackProvider;
use crate::settings::ProjectSettings;
use crate::template::{
    DependsOn, OutputDefinition, ParameterDefinition, ResourceDefinition, Template,
    ACCESS_CONTROL_RESOURCE_NAME,
};
use crate::util;

/// Where a group's directory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceGroupSource {
    /// Under the project's own resource-group directory.
    Project,
    /// Provided by an installed gem.
    Gem,
}

/// One resource group: a name, a directory, and its template.
#[derive(Debug)]
pub struct ResourceGroup {
    name: String,
    directory: PathBuf,
    source: ResourceGroupSource,
    template: Option<Template>,
}

impl ResourceGroup {
    /// Opens an existing group directory. The name must be a valid stack
    /// name since it becomes part of the nested stack's name.
    pub fn new(name: &str, directory: PathBuf, source: ResourceGroupSource) -> Result<Self> {
        util::validate_stack_name(name)?;
        Ok(ResourceGroup {
            name: name.to_string(),
            directory,
            source,
            template: None,
        })
    }

    /// Creates a new project-local group directory with a starter template.
    pub fn create(root: &Path, name: &str) -> Result<Self> {
        util::validate_stack_name(name)?;
        let directory = root
            .join(defaults::RESOURCE_GROUP_DIRECTORY_NAME)
            .join(name);
        let template_path = directory.join(defaults::RESOURCE_GROUP_TEMPLATE_FILENAME);
        if template_path.exists() {
            return Err(Error::usage(format!(
                "The {} resource group already exists.",
                name
            )));
        }
        let template = starter_template();
        template.save(&template_path)?;
        log::info!("created resource group {} at {}", name, directory.display());
        Ok(ResourceGroup {
            name: name.to_string(),
            directory,
            source: ResourceGroupSource::Project,
            template: Some(template),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn source(&self) -> ResourceGroupSource {
        self.source
    }

    pub fn template_path(&self) -> PathBuf {
        self.directory.join(defaults::RESOURCE_GROUP_TEMPLATE_FILENAME)
    }

    /// The group's template, loaded on first access.
    pub fn template(&mut self) -> Result<&Template> {
        if self.template.is_none() {
            self.template = Some(Template::load(&self.template_path())?);
        }
        Ok(self.template.as_ref().unwrap())
    }

    fn template_mut(&mut self) -> Result<&mut Template> {
        self.template()?;
        Ok(self.template.as_mut().unwrap())
    }

    /// Persists the template back to the group directory.
    pub fn save_template(&mut self) -> Result<()> {
        let path = self.template_path();
        self.template()?.save(&path)
    }

    /// Inserts resources into the template.
    ///
    /// Existing names are skipped unless `force` is set. A resource carrying
    /// `Permissions` or `RoleMappings` metadata is registered as a
    /// dependency of the `AccessControl` resource, which is created with a
    /// default definition when absent. The `dependencies` map adds explicit
    /// `DependsOn` entries onto named resources; naming a resource that does
    /// not exist afterwards is fatal.
    pub fn add_resources(
        &mut self,
        definitions: BTreeMap<String, ResourceDefinition>,
        force: bool,
        dependencies: &BTreeMap<String, Vec<String>>,
    ) -> Result<bool> {
        let template = self.template_mut()?;
        let mut changed = false;

        for (name, definition) in definitions {
            if template.resources.contains_key(&name) && !force {
                log::debug!("resource {} already present, skipping", name);
                continue;
            }
            let needs_access_control = definition.framework_metadata("Permissions").is_some()
                || definition.framework_metadata("RoleMappings").is_some();
            template.resources.insert(name.clone(), definition);
            changed = true;

            if needs_access_control && name != ACCESS_CONTROL_RESOURCE_NAME {
                let access_control = template
                    .resources
                    .entry(ACCESS_CONTROL_RESOURCE_NAME.to_string())
                    .or_insert_with(default_access_control_definition);
                access_control.add_dependencies(std::slice::from_ref(&name));
            }
        }

        for (target, names) in dependencies {
            let definition = template.resources.get_mut(target).ok_or_else(|| {
                Error::usage(format!(
                    "Cannot add a dependency to resource {} because it does not exist.",
                    target
                ))
            })?;
            if definition.add_dependencies(names) {
                changed = true;
            }
        }

        Ok(changed)
    }

    /// Removes named resources and scrubs them from every remaining
    /// resource's `DependsOn`. Unknown names are tolerated.
    pub fn remove_resources(&mut self, names: &[String]) -> Result<bool> {
        let template = self.template_mut()?;
        let mut changed = false;
        for name in names {
            if template.resources.remove(name).is_some() {
                changed = true;
            }
        }
        for definition in template.resources.values_mut() {
            if definition.remove_dependencies(names) {
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Inserts parameters, skipping existing names unless forced.
    pub fn add_parameters(
        &mut self,
        definitions: BTreeMap<String, ParameterDefinition>,
        force: bool,
    ) -> Result<bool> {
        let template = self.template_mut()?;
        let mut changed = false;
        for (name, definition) in definitions {
            if template.parameters.contains_key(&name) && !force {
                continue;
            }
            template.parameters.insert(name, definition);
            changed = true;
        }
        Ok(changed)
    }

    pub fn remove_parameters(&mut self, names: &[String]) -> Result<bool> {
        let template = self.template_mut()?;
        let mut changed = false;
        for name in names {
            if template.parameters.remove(name).is_some() {
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Inserts an output, skipping an existing name unless forced.
    pub fn add_output(
        &mut self,
        name: &str,
        definition: OutputDefinition,
        force: bool,
    ) -> Result<bool> {
        let template = self.template_mut()?;
        if template.outputs.contains_key(name) && !force {
            return Ok(false);
        }
        template.outputs.insert(name.to_string(), definition);
        Ok(true)
    }

    pub fn remove_output(&mut self, name: &str) -> Result<bool> {
        Ok(self.template_mut()?.outputs.remove(name).is_some())
    }

    /// The template with each parameter's `Default` overridden per the
    /// settings fallback order. With no deployment context the template is
    /// returned unmodified.
    pub fn template_with_parameters(
        &mut self,
        settings: &ProjectSettings,
        deployment_name: Option<&str>,
    ) -> Result<Template> {
        let name = self.name.clone();
        let mut template = self.template()?.clone();
        if let Some(deployment_name) = deployment_name {
            for (parameter_name, definition) in template.parameters.iter_mut() {
                if let Some(value) =
                    settings.resolve_parameter(deployment_name, &name, parameter_name)
                {
                    definition.default = Some(value.clone());
                }
            }
        }
        Ok(template)
    }

    /// The effective parameter values for this group under a deployment,
    /// applying the settings layers over template defaults. Values are
    /// stringified the way the stack provider expects.
    pub fn parameter_values(
        &mut self,
        settings: &ProjectSettings,
        deployment_name: &str,
    ) -> Result<BTreeMap<String, String>> {
        let template = self.template_with_parameters(settings, Some(deployment_name))?;
        let mut values = BTreeMap::new();
        for (name, definition) in &template.parameters {
            if let Some(default) = &definition.default {
                values.insert(name.clone(), util::parameter_value_string(default));
            }
        }
        Ok(values)
    }

    /// The content paths whose modification times feed change detection,
    /// keyed by resource type. Function code is watched as a directory; API
    /// resources watch their definition file.
    pub fn content_paths(&mut self) -> Result<BTreeMap<String, Vec<PathBuf>>> {
        let directory = self.directory.clone();
        let template = self.template()?;
        let mut paths: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for definition in template.resources.values() {
            let path = match definition.resource_type.as_str() {
                "AWS::Lambda::Function" => directory.join(defaults::LAMBDA_CODE_DIRECTORY_NAME),
                "Custom::ServiceApi" => directory.join(defaults::SWAGGER_FILENAME),
                _ => continue,
            };
            let entry = paths.entry(definition.resource_type.clone()).or_default();
            if !entry.contains(&path) {
                entry.push(path);
            }
        }
        Ok(paths)
    }

    /// Classifies every resource of this group as pending create, update,
    /// or delete relative to its deployed nested stack. With no stack yet,
    /// everything is a pending create.
    pub fn pending_resource_status(
        &mut self,
        provider: &dyn StackProvider,
        settings: &ProjectSettings,
        deployment_name: &str,
        stack_id: Option<&str>,
    ) -> Result<BTreeMap<String, PendingResourceStatus>> {
        let new_template = self.template_with_parameters(settings, Some(deployment_name))?;
        let new_parameters = self.parameter_values(settings, deployment_name)?;
        let content_paths = self.content_paths()?;

        let (old_template, old_parameters, stack_last_updated) = match stack_id {
            Some(stack_id) => {
                let description = provider.describe_stack(stack_id)?.ok_or_else(|| {
                    Error::state(format!("Stack {} no longer exists.", stack_id))
                })?;
                let template = provider.get_current_template(stack_id)?;
                (template, description.parameters, description.last_updated)
            }
            None => (
                Template::empty(),
                BTreeMap::new(),
                std::time::SystemTime::now(),
            ),
        };

        Ok(pending::resolve_pending_status(&ChangeInput {
            old_template: &old_template,
            new_template: &new_template,
            old_parameter_values: &old_parameters,
            new_parameter_values: &new_parameters,
            content_paths: &content_paths,
            stack_last_updated,
        }))
    }
}

/// Lists the project-local resource groups under `root`, in name order.
pub fn list_resource_groups(root: &Path) -> Result<Vec<ResourceGroup>> {
    let groups_directory = root.join(defaults::RESOURCE_GROUP_DIRECTORY_NAME);
    let mut groups = Vec::new();
    if !groups_directory.is_dir() {
        return Ok(groups);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&groups_directory)?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = entry.path();
        if !path.join(defaults::RESOURCE_GROUP_TEMPLATE_FILENAME).is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // A stray directory must not break listing the valid groups.
        match ResourceGroup::new(&name, path, ResourceGroupSource::Project) {
            Ok(group) => groups.push(group),
            Err(error) => log::warn!("skipping resource group directory {}: {}", name, error),
        }
    }
    Ok(groups)
}

/// Looks up one project-local resource group by name.
pub fn find_resource_group(root: &Path, name: &str) -> Result<ResourceGroup> {
    let directory = root
        .join(defaults::RESOURCE_GROUP_DIRECTORY_NAME)
        .join(name);
    if !directory
        .join(defaults::RESOURCE_GROUP_TEMPLATE_FILENAME)
        .is_file()
    {
        return Err(Error::usage(format!(
            "The {} resource group does not exist.",
            name
        )));
    }
    ResourceGroup::new(name, directory, ResourceGroupSource::Project)
}

/// The default `AccessControl` resource definition, created the first time
/// a resource with permission metadata is added.
pub fn default_access_control_definition() -> ResourceDefinition {
    let mut definition = ResourceDefinition::of_type("Custom::AccessControl");
    definition.properties.insert(
        "ServiceToken".to_string(),
        json!({ "Ref": "ProjectResourceHandler" }),
    );
    definition.properties.insert(
        "ConfigurationBucket".to_string(),
        json!({ "Ref": "ConfigurationBucket" }),
    );
    definition.properties.insert(
        "ConfigurationKey".to_string(),
        json!({ "Ref": "ConfigurationKey" }),
    );
    definition.depends_on = Some(DependsOn::Many(Vec::new()));
    definition
}

fn configuration_parameter(description: &str) -> ParameterDefinition {
    ParameterDefinition {
        parameter_type: Some("String".to_string()),
        description: Some(description.to_string()),
        ..ParameterDefinition::default()
    }
}

fn starter_template() -> Template {
    let mut template = Template::empty();
    template.parameters.insert(
        "ConfigurationBucket".to_string(),
        configuration_parameter("Bucket that contains configuration data."),
    );
    template.parameters.insert(
        "ConfigurationKey".to_string(),
        configuration_parameter("Location in the configuration bucket of configuration data."),
    );
    template
}
