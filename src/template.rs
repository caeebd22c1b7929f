//! # Infrastructure Template Model
//!
//! Typed representation of a stack template: a JSON document with
//! `Parameters`, `Resources` and `Outputs` sections. Unknown top-level keys
//! and unknown keys inside definitions are preserved through a flattened
//! map, so loading and re-saving a template never drops content the model
//! does not understand.
//!
//! ## Key Components
//!
//! - **`Template`**: the document itself. Sections are `BTreeMap`s, giving
//!   deterministic, key-sorted serialization.
//! - **`ResourceDefinition`**: one resource: `Type`, opaque `Properties`,
//!   optional `DependsOn` (scalar or list), `Metadata` including the
//!   framework's `CloudCanvas` annotations.
//! - **`DependsOn`**: the scalar-or-list dependency form. Structural edits
//!   must handle both forms; helpers here normalize on demand.
//!
//! Templates are loaded from disk on first access, cached by their owners,
//! mutated in memory, and explicitly persisted with [`Template::save`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::util;

/// Template format version written into generated templates.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Metadata namespace carrying framework-specific resource annotations.
pub const METADATA_NAMESPACE: &str = "CloudCanvas";

/// The logical name of the access-control resource, when present.
pub const ACCESS_CONTROL_RESOURCE_NAME: &str = "AccessControl";

/// A resource's `DependsOn` entry, which the template format allows as
/// either a single name or a list of names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    One(String),
    Many(Vec<String>),
}

impl DependsOn {
    /// Returns true if the dependency set contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            DependsOn::One(n) => n == name,
            DependsOn::Many(names) => names.iter().any(|n| n == name),
        }
    }

    /// Returns the dependencies as a list, promoting the scalar form.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DependsOn::One(n) => vec![n.clone()],
            DependsOn::Many(names) => names.clone(),
        }
    }
}

/// One parameter definition. Extension templates must give every parameter
/// a `Default`; the merge step enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParameterDefinition {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub parameter_type: Option<String>,

    #[serde(rename = "Default", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One output definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefinition {
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Value")]
    pub value: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One resource definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// String tag identifying the cloud resource kind.
    #[serde(rename = "Type")]
    pub resource_type: String,

    /// Opaque property map handed to the stack engine.
    #[serde(rename = "Properties", default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    #[serde(rename = "DependsOn", default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,

    #[serde(rename = "Metadata", default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceDefinition {
    /// Creates a definition with the given type and no properties.
    pub fn of_type(resource_type: impl Into<String>) -> Self {
        ResourceDefinition {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: None,
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Looks up a framework annotation under `Metadata.CloudCanvas`.
    pub fn framework_metadata(&self, name: &str) -> Option<&Value> {
        self.metadata.get(METADATA_NAMESPACE)?.get(name)
    }

    /// Sets a framework annotation under `Metadata.CloudCanvas`.
    pub fn set_framework_metadata(&mut self, name: &str, value: Value) {
        let namespace = self
            .metadata
            .entry(METADATA_NAMESPACE.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !namespace.is_object() {
            *namespace = Value::Object(Map::new());
        }
        namespace
            .as_object_mut()
            .expect("namespace was just made an object")
            .insert(name.to_string(), value);
    }

    /// Returns true if this resource depends (directly) on `name`.
    pub fn depends_on_contains(&self, name: &str) -> bool {
        self.depends_on
            .as_ref()
            .map(|d| d.contains(name))
            .unwrap_or(false)
    }

    /// Merges names into `DependsOn` as a set union, preserving existing
    /// entries and promoting a scalar `DependsOn` to a list first.
    ///
    /// Returns true if the dependency list changed.
    pub fn add_dependencies(&mut self, names: &[String]) -> bool {
        let existing = self.depends_on.take();
        let mut list = match &existing {
            Some(depends_on) => depends_on.to_vec(),
            None => Vec::new(),
        };
        let mut changed = false;
        for name in names {
            if !list.iter().any(|n| n == name) {
                list.push(name.clone());
                changed = true;
            }
        }
        // Only normalize the stored form when something was inserted, so a
        // no-op add cannot alter the serialized template.
        self.depends_on = if changed {
            Some(DependsOn::Many(list))
        } else {
            existing
        };
        changed
    }

    /// Removes any of `names` from `DependsOn`, handling both the scalar
    /// and list forms. A removal that empties the dependency set drops the
    /// `DependsOn` entry entirely. Returns true if anything was removed.
    pub fn remove_dependencies(&mut self, names: &[String]) -> bool {
        let mut changed = false;
        self.depends_on = match self.depends_on.take() {
            Some(DependsOn::One(n)) if names.iter().any(|r| *r == n) => {
                changed = true;
                None
            }
            Some(DependsOn::Many(mut list)) => {
                let before = list.len();
                list.retain(|n| !names.iter().any(|r| r == n));
                changed = list.len() != before;
                if changed && list.is_empty() {
                    None
                } else {
                    Some(DependsOn::Many(list))
                }
            }
            other => other,
        };
        changed
    }
}

/// A stack template document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Template {
    #[serde(
        rename = "AWSTemplateFormatVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format_version: Option<String>,

    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterDefinition>,

    #[serde(rename = "Resources", default)]
    pub resources: BTreeMap<String, ResourceDefinition>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, OutputDefinition>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    /// The documented empty-template default used when an optional extension
    /// file is absent.
    pub fn empty() -> Self {
        Template {
            format_version: Some(TEMPLATE_FORMAT_VERSION.to_string()),
            ..Template::default()
        }
    }

    /// Loads a template from disk. The file must exist and parse.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(util::load_json(path, true)?.expect("required load returns a value"))
    }

    /// Loads an optional template from disk, returning the empty default
    /// when the file is absent. Extension template files are optional.
    pub fn load_optional(path: &Path) -> Result<Self> {
        Ok(util::load_json(path, false)?.unwrap_or_else(Template::empty))
    }

    /// Writes the template as pretty-printed, key-sorted JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        util::save_json(path, self)
    }

    /// Rewires the `AccessControl` resource's `DependsOn` so that it depends
    /// on every other resource that does not itself directly depend on
    /// `AccessControl`. Access-control creation then happens after all
    /// resources whose permissions it may reference.
    ///
    /// Recomputed on every merge; idempotent for a given resource set, and
    /// never introduces a self-dependency.
    pub fn wire_access_control(&mut self) {
        if !self.resources.contains_key(ACCESS_CONTROL_RESOURCE_NAME) {
            return;
        }

        let mut access_control_depends_on = Vec::new();
        for (name, definition) in &self.resources {
            if name == ACCESS_CONTROL_RESOURCE_NAME {
                continue;
            }
            if !definition.depends_on_contains(ACCESS_CONTROL_RESOURCE_NAME) {
                access_control_depends_on.push(name.clone());
            }
        }

        let access_control = self
            .resources
            .get_mut(ACCESS_CONTROL_RESOURCE_NAME)
            .expect("presence checked above");
        access_control.depends_on = Some(DependsOn::Many(access_control_depends_on));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn resource(resource_type: &str) -> ResourceDefinition {
        ResourceDefinition::of_type(resource_type)
    }

    #[test]
    fn test_template_parses_scalar_and_list_depends_on() {
        let template: Template = serde_json::from_value(json!({
            "Resources": {
                "A": { "Type": "X", "DependsOn": "B" },
                "B": { "Type": "Y", "DependsOn": ["C", "D"] },
                "C": { "Type": "Z" },
                "D": { "Type": "Z" }
            }
        }))
        .unwrap();

        assert!(template.resources["A"].depends_on_contains("B"));
        assert!(template.resources["B"].depends_on_contains("C"));
        assert!(template.resources["B"].depends_on_contains("D"));
        assert!(!template.resources["C"].depends_on_contains("A"));
    }

    #[test]
    fn test_template_preserves_unknown_keys() {
        let original = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": "top-level extra",
            "Resources": {
                "A": { "Type": "X", "Condition": "SomeCondition" }
            }
        });
        let template: Template = serde_json::from_value(original.clone()).unwrap();
        let round_tripped = serde_json::to_value(&template).unwrap();
        assert_eq!(round_tripped, original);
    }

    #[test]
    fn test_wire_access_control_basic() {
        let mut template = Template::empty();
        template.resources.insert("A".into(), resource("X"));
        template.resources.insert("B".into(), resource("Y"));
        template
            .resources
            .insert(ACCESS_CONTROL_RESOURCE_NAME.into(), resource("Custom::AccessControl"));

        template.wire_access_control();

        let deps = template.resources[ACCESS_CONTROL_RESOURCE_NAME]
            .depends_on
            .as_ref()
            .unwrap()
            .to_vec();
        assert_eq!(deps, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_wire_access_control_skips_dependents() {
        let mut template = Template::empty();
        let mut dependent = resource("X");
        dependent.depends_on = Some(DependsOn::One(ACCESS_CONTROL_RESOURCE_NAME.into()));
        template.resources.insert("A".into(), dependent);
        template.resources.insert("B".into(), resource("Y"));
        template
            .resources
            .insert(ACCESS_CONTROL_RESOURCE_NAME.into(), resource("Custom::AccessControl"));

        template.wire_access_control();

        let deps = template.resources[ACCESS_CONTROL_RESOURCE_NAME]
            .depends_on
            .as_ref()
            .unwrap()
            .to_vec();
        // A already depends on AccessControl, so only B is wired in, and
        // AccessControl never depends on itself.
        assert_eq!(deps, vec!["B".to_string()]);
    }

    #[test]
    fn test_wire_access_control_idempotent() {
        let mut template = Template::empty();
        template.resources.insert("A".into(), resource("X"));
        template
            .resources
            .insert(ACCESS_CONTROL_RESOURCE_NAME.into(), resource("Custom::AccessControl"));

        template.wire_access_control();
        let first = template.clone();
        template.wire_access_control();
        assert_eq!(template, first);
    }

    #[test]
    fn test_wire_access_control_absent_is_noop() {
        let mut template = Template::empty();
        template.resources.insert("A".into(), resource("X"));
        let before = template.clone();
        template.wire_access_control();
        assert_eq!(template, before);
    }

    #[test]
    fn test_add_dependencies_promotes_scalar() {
        let mut definition = resource("X");
        definition.depends_on = Some(DependsOn::One("B".into()));
        let changed = definition.add_dependencies(&["C".to_string(), "B".to_string()]);
        assert!(changed);
        let deps = definition.depends_on.as_ref().unwrap().to_vec();
        assert_eq!(deps, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_add_dependencies_noop_keeps_serialized_form() {
        let mut definition = resource("X");
        definition.depends_on = Some(DependsOn::One("B".into()));
        let before = serde_json::to_value(&definition).unwrap();

        assert!(!definition.add_dependencies(&["B".to_string()]));
        assert_eq!(serde_json::to_value(&definition).unwrap(), before);

        let mut bare = resource("Y");
        assert!(!bare.add_dependencies(&[]));
        assert!(bare.depends_on.is_none());
    }

    #[test]
    fn test_remove_dependencies_scalar_form() {
        let mut definition = resource("X");
        definition.depends_on = Some(DependsOn::One("B".into()));
        assert!(definition.remove_dependencies(&["B".to_string()]));
        assert!(!definition.depends_on_contains("B"));
    }

    #[test]
    fn test_remove_dependencies_list_form() {
        let mut definition = resource("X");
        definition.depends_on = Some(DependsOn::Many(vec!["B".into(), "C".into()]));
        assert!(definition.remove_dependencies(&["B".to_string()]));
        assert_eq!(
            definition.depends_on.as_ref().unwrap().to_vec(),
            vec!["C".to_string()]
        );
    }

    #[test]
    fn test_framework_metadata_lookup() {
        let definition: ResourceDefinition = serde_json::from_value(json!({
            "Type": "AWS::S3::Bucket",
            "Metadata": { "CloudCanvas": { "Permissions": { "Action": "s3:GetObject" } } }
        }))
        .unwrap();
        assert!(definition.framework_metadata("Permissions").is_some());
        assert!(definition.framework_metadata("RoleMappings").is_none());
    }

    #[test]
    fn test_save_is_key_sorted_and_pretty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("template.json");
        let mut template = Template::empty();
        template.resources.insert("Zeta".into(), resource("X"));
        template.resources.insert("Alpha".into(), resource("Y"));
        template.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let alpha = content.find("Alpha").unwrap();
        let zeta = content.find("Zeta").unwrap();
        assert!(alpha < zeta);
        assert!(content.contains('\n'));
    }

    #[test]
    fn test_load_optional_missing_returns_empty_default() {
        let temp = TempDir::new().unwrap();
        let template = Template::load_optional(&temp.path().join("missing.json")).unwrap();
        assert_eq!(template.format_version.as_deref(), Some(TEMPLATE_FORMAT_VERSION));
        assert!(template.resources.is_empty());
        assert!(template.parameters.is_empty());
        assert!(template.outputs.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn name_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9]{0,8}"
    }

    proptest! {
        // Removing a set of names leaves no trace of them, whichever form
        // DependsOn started in.
        #[test]
        fn removed_dependencies_are_gone(
            initial in proptest::collection::vec(name_strategy(), 0..6),
            removed in proptest::collection::vec(name_strategy(), 0..6),
            scalar in proptest::bool::ANY,
        ) {
            let mut definition = ResourceDefinition::of_type("X");
            definition.depends_on = match (scalar, initial.first()) {
                (true, Some(first)) => Some(DependsOn::One(first.clone())),
                _ => Some(DependsOn::Many(initial.clone())),
            };
            definition.remove_dependencies(&removed);
            for name in &removed {
                prop_assert!(!definition.depends_on_contains(name));
            }
        }

        // Adding then removing the same names restores an empty-or-original
        // dependency set with no duplicates introduced.
        #[test]
        fn add_dependencies_never_duplicates(
            names in proptest::collection::vec(name_strategy(), 0..6),
        ) {
            let mut definition = ResourceDefinition::of_type("X");
            definition.add_dependencies(&names);
            definition.add_dependencies(&names);
            match &definition.depends_on {
                Some(depends_on) => {
                    let list = depends_on.to_vec();
                    let unique: std::collections::BTreeSet<_> = list.iter().collect();
                    prop_assert_eq!(list.len(), unique.len());
                }
                None => prop_assert!(names.is_empty()),
            }
        }
    }
}
