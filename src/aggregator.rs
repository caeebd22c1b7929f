//! # Template Aggregation
//!
//! An effective stack template is composed from a base template file shipped
//! with the tool and an optional extension template file in the project's
//! AWS directory. This module owns that composition:
//!
//! - loading and caching the base and extension templates,
//! - splicing extension parameters/resources/outputs into a deep copy of the
//!   base, enforcing the non-override invariant (an extension may add names
//!   but never redefine one the base already owns),
//! - stamping each spliced resource with a `Metadata.CloudCanvas.Source`
//!   attribution (a project-root-relative path, diagnostics only),
//! - rewiring the `AccessControl` dependency list after every merge,
//! - for deployment templates, contributing the nested-stack resource and
//!   its paired configuration resource for every enabled resource group.
//!
//! The effective template is derived state: it is cached until the
//! extension template is saved and is never persisted itself.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::template::{ResourceDefinition, Template};

/// Logical-name suffix for a resource group's paired configuration resource.
pub const CONFIGURATION_SUFFIX: &str = "Configuration";

/// Placeholder inserted when a deployment template would otherwise have no
/// resources. The stack engine rejects templates with an empty Resources map.
pub const EMPTY_DEPLOYMENT_RESOURCE_NAME: &str = "EmptyDeployment";

/// Composes a base template with a project extension template.
///
/// Constructed explicitly when the project context is built; there is no
/// lazy global state. The caches here only avoid re-reading unchanged files
/// within a single command run.
#[derive(Debug)]
pub struct TemplateAggregator {
    base_path: PathBuf,
    extension_path: PathBuf,
    attribution_root: PathBuf,
    base: Option<Template>,
    extension: Option<Template>,
    effective: Option<Template>,
}

impl TemplateAggregator {
    /// Creates an aggregator over the given base and extension files.
    /// `attribution_root` is the project root used to relativize source
    /// attributions.
    pub fn new(base_path: PathBuf, extension_path: PathBuf, attribution_root: PathBuf) -> Self {
        TemplateAggregator {
            base_path,
            extension_path,
            attribution_root,
            base: None,
            extension: None,
            effective: None,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn extension_path(&self) -> &Path {
        &self.extension_path
    }

    /// The base template. Required: a missing or malformed file is a
    /// configuration error.
    pub fn base_template(&mut self) -> Result<&Template> {
        if self.base.is_none() {
            log::debug!("loading base template from {}", self.base_path.display());
            self.base = Some(Template::load(&self.base_path)?);
        }
        Ok(self.base.as_ref().expect("cached above"))
    }

    /// The extension template. Optional: a missing file yields the
    /// documented empty default.
    pub fn extension_template(&mut self) -> Result<&Template> {
        if self.extension.is_none() {
            log::debug!(
                "loading extension template from {}",
                self.extension_path.display()
            );
            self.extension = Some(Template::load_optional(&self.extension_path)?);
        }
        Ok(self.extension.as_ref().expect("cached above"))
    }

    /// Mutable access to the extension template for structural edits.
    pub fn extension_template_mut(&mut self) -> Result<&mut Template> {
        self.extension_template()?;
        Ok(self.extension.as_mut().expect("cached above"))
    }

    /// Persists the extension template and invalidates the cached effective
    /// template so it is recomputed on next access.
    pub fn save_extension_template(&mut self) -> Result<()> {
        let path = self.extension_path.clone();
        let template = self.extension_template()?.clone();
        template.save(&path)?;
        self.effective = None;
        Ok(())
    }

    /// The effective template: a deep copy of the base with the extension
    /// content spliced in and `AccessControl` dependencies rewired.
    pub fn effective_template(&mut self) -> Result<&Template> {
        if self.effective.is_none() {
            let attribution = attribution_for(&self.extension_path, &self.attribution_root);
            let extension = self.extension_template()?.clone();
            let mut effective = self.base_template()?.clone();
            merge_into(&mut effective, &extension, &attribution)?;
            effective.wire_access_control();
            self.effective = Some(effective);
        }
        Ok(self.effective.as_ref().expect("cached above"))
    }
}

/// Relativizes `path` against the project root for diagnostic attribution.
/// Falls back to the absolute path when the file lives outside the root.
pub fn attribution_for(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// Splices `source` parameters, resources and outputs into `target`.
///
/// Every copied resource is stamped with `Metadata.CloudCanvas.Source =
/// source_label`. Collisions with names already present in `target` are
/// fatal configuration errors, as is an extension parameter without a
/// `Default` value.
pub fn merge_into(target: &mut Template, source: &Template, source_label: &str) -> Result<()> {
    copy_parameters(target, source, source_label)?;
    copy_resources(target, source, source_label)?;
    copy_outputs(target, source, source_label)?;
    Ok(())
}

fn copy_parameters(target: &mut Template, source: &Template, source_label: &str) -> Result<()> {
    for (name, definition) in &source.parameters {
        if definition.default.is_none() {
            return Err(Error::config_with_hint(
                format!(
                    "Parameter {} has no default value in extension template {}.",
                    name, source_label
                ),
                "extension template parameters must declare a Default",
            ));
        }
        if target.parameters.contains_key(name) {
            return Err(Error::config(format!(
                "Parameter {} cannot be overridden by extension template {}.",
                name, source_label
            )));
        }
        target.parameters.insert(name.clone(), definition.clone());
    }
    Ok(())
}

fn copy_resources(target: &mut Template, source: &Template, source_label: &str) -> Result<()> {
    for (name, definition) in &source.resources {
        if target.resources.contains_key(name) {
            return Err(Error::config(format!(
                "Resource {} cannot be overridden by extension template {}.",
                name, source_label
            )));
        }
        let mut definition = definition.clone();
        definition.set_framework_metadata("Source", Value::String(source_label.to_string()));
        target.resources.insert(name.clone(), definition);
    }
    Ok(())
}

fn copy_outputs(target: &mut Template, source: &Template, source_label: &str) -> Result<()> {
    for (name, definition) in &source.outputs {
        if target.outputs.contains_key(name) {
            return Err(Error::config(format!(
                "Output {} cannot be overridden by extension template {}.",
                name, source_label
            )));
        }
        target.outputs.insert(name.clone(), definition.clone());
    }
    Ok(())
}

/// The definition of a resource group's paired configuration resource in a
/// deployment template.
pub fn resource_group_configuration_definition(group_name: &str) -> ResourceDefinition {
    definition_from_json(json!({
        "Type": "Custom::ResourceGroupConfiguration",
        "Properties": {
            "ServiceToken": { "Ref": "ProjectResourceHandler" },
            "ConfigurationBucket": { "Ref": "ConfigurationBucket" },
            "ConfigurationKey": { "Ref": "ConfigurationKey" },
            "ResourceGroupName": group_name
        }
    }))
}

/// The definition of a resource group's nested-stack resource in a
/// deployment template.
pub fn resource_group_stack_definition(group_name: &str) -> ResourceDefinition {
    let configuration_name = configuration_resource_name(group_name);
    definition_from_json(json!({
        "Type": "AWS::CloudFormation::Stack",
        "Properties": {
            "TemplateURL": { "Fn::GetAtt": [ configuration_name, "TemplateURL" ] },
            "Parameters": {
                "ProjectResourceHandler": { "Ref": "ProjectResourceHandler" },
                "ConfigurationBucket": { "Fn::GetAtt": [ configuration_name, "ConfigurationBucket" ] },
                "ConfigurationKey": { "Fn::GetAtt": [ configuration_name, "ConfigurationKey" ] },
                "DeploymentStackArn": { "Ref": "AWS::StackId" },
                "DeploymentName": { "Ref": "DeploymentName" },
                "ResourceGroupName": group_name
            }
        }
    }))
}

/// The placeholder resource for deployments with no resource groups.
pub fn empty_deployment_definition() -> ResourceDefinition {
    definition_from_json(json!({
        "Type": "Custom::EmptyDeployment",
        "Properties": {
            "ServiceToken": { "Ref": "ProjectResourceHandler" }
        }
    }))
}

fn definition_from_json(value: Value) -> ResourceDefinition {
    serde_json::from_value(value).expect("static resource definition is well formed")
}

/// Logical name of a group's paired configuration resource.
pub fn configuration_resource_name(group_name: &str) -> String {
    format!("{}{}", group_name, CONFIGURATION_SUFFIX)
}

/// Computes the effective deployment template: the aggregator's effective
/// template plus, for each named resource group, the nested-stack resource
/// and its configuration resource, with the `EmptyDeployment` placeholder
/// maintained for an otherwise-empty deployment.
pub fn deployment_effective_template(
    aggregator: &mut TemplateAggregator,
    group_names: &[String],
) -> Result<Template> {
    let mut template = aggregator.effective_template()?.clone();

    for group_name in group_names {
        template.resources.insert(
            configuration_resource_name(group_name),
            resource_group_configuration_definition(group_name),
        );
        template
            .resources
            .insert(group_name.clone(), resource_group_stack_definition(group_name));
    }

    ensure_placeholder(&mut template);
    Ok(template)
}

/// Inserts the `EmptyDeployment` placeholder when the template has no
/// resources. The stack engine rejects zero-resource templates.
pub fn ensure_placeholder(template: &mut Template) {
    if template.resources.is_empty() {
        template.resources.insert(
            EMPTY_DEPLOYMENT_RESOURCE_NAME.to_string(),
            empty_deployment_definition(),
        );
    }
}
