//! File-backed provider implementations.
//!
//! These keep all stack state as JSON records under a root directory, one
//! file per stack, and model uploads and object storage as plain files.
//! They give the CLI something real to run against without any remote
//! account, and the integration tests exercise the orchestration engine
//! through them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{
    ContentUploader, ObjectStore, ResourceDescription, StackDescription, StackProvider,
    StackStatus,
};
use crate::template::Template;
use crate::util;

const STACKS_DIRECTORY_NAME: &str = "stacks";
const UPLOADS_DIRECTORY_NAME: &str = "uploads";
const OBJECTS_DIRECTORY_NAME: &str = "objects";

/// The on-disk record for one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StackRecord {
    stack_id: String,
    name: String,
    status: StackStatus,
    parameters: BTreeMap<String, String>,
    template: Template,
    /// Seconds since the epoch of the last create or update.
    last_updated: u64,
}

impl StackRecord {
    fn last_updated_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.last_updated)
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A stack provider that records stacks as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStackProvider {
    root: PathBuf,
}

impl LocalStackProvider {
    pub fn new(root: PathBuf) -> Self {
        LocalStackProvider { root }
    }

    fn stacks_directory(&self) -> PathBuf {
        self.root.join(STACKS_DIRECTORY_NAME)
    }

    /// The record path for a stack id. The serial segment of the id is the
    /// file name, so renumbering a stack never aliases another record.
    fn record_path(&self, stack_id: &str) -> Result<PathBuf> {
        let serial = stack_id.rsplit('/').next().filter(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
        });
        match serial {
            Some(serial) => Ok(self.stacks_directory().join(format!("{}.json", serial))),
            None => Err(Error::provider(
                "describe",
                format!("{} is not a valid stack id.", stack_id),
            )),
        }
    }

    fn load_record(&self, stack_id: &str) -> Result<Option<StackRecord>> {
        util::load_json(&self.record_path(stack_id)?, false)
    }

    fn save_record(&self, record: &StackRecord) -> Result<()> {
        util::save_json(&self.record_path(&record.stack_id)?, record)
    }

    fn require_record(&self, operation: &str, stack_id: &str) -> Result<StackRecord> {
        self.load_record(stack_id)?.ok_or_else(|| {
            Error::provider(
                operation,
                format!("Stack {} does not exist.", stack_id),
            )
        })
    }

    fn new_stack_id(&self, name: &str) -> String {
        let serial = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!(
            "arn:local:stacks:local:000000000000:stack/{}/{:x}",
            name, serial
        )
    }
}

impl StackProvider for LocalStackProvider {
    fn create_stack(
        &self,
        name: &str,
        template: &Template,
        parameters: &BTreeMap<String, String>,
    ) -> Result<String> {
        if template.resources.is_empty() {
            return Err(Error::provider(
                "create",
                "Template format error: at least one Resources member must be defined.",
            ));
        }
        let record = StackRecord {
            stack_id: self.new_stack_id(name),
            name: name.to_string(),
            status: StackStatus::CreateComplete,
            parameters: parameters.clone(),
            template: template.clone(),
            last_updated: now_epoch_seconds(),
        };
        self.save_record(&record)?;
        log::debug!("created stack {}", record.stack_id);
        Ok(record.stack_id)
    }

    fn update_stack(
        &self,
        stack_id: &str,
        template: &Template,
        parameters: &BTreeMap<String, String>,
    ) -> Result<()> {
        if template.resources.is_empty() {
            return Err(Error::provider(
                "update",
                "Template format error: at least one Resources member must be defined.",
            ));
        }
        let mut record = self.require_record("update", stack_id)?;
        record.template = template.clone();
        record.parameters = parameters.clone();
        record.status = StackStatus::UpdateComplete;
        record.last_updated = now_epoch_seconds();
        self.save_record(&record)?;
        log::debug!("updated stack {}", stack_id);
        Ok(())
    }

    fn delete_stack(&self, stack_id: &str) -> Result<()> {
        let path = self.record_path(stack_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("deleted stack {}", stack_id);
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn describe_stack(&self, stack_id: &str) -> Result<Option<StackDescription>> {
        // An id this provider never issued describes no stack, it is not an
        // error. Nested-stack physical ids fall in this bucket.
        if self.record_path(stack_id).is_err() {
            return Ok(None);
        }
        let record = match self.load_record(stack_id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let outputs = record
            .template
            .outputs
            .keys()
            .map(|name| (name.clone(), format!("{}-{}", record.name, name)))
            .collect();
        Ok(Some(StackDescription {
            stack_id: record.stack_id.clone(),
            name: record.name.clone(),
            status: record.status,
            parameters: record.parameters.clone(),
            outputs,
            last_updated: record.last_updated_time(),
        }))
    }

    fn describe_stack_resources(&self, stack_id: &str) -> Result<Vec<ResourceDescription>> {
        let record = self.require_record("describe", stack_id)?;
        Ok(record
            .template
            .resources
            .iter()
            .map(|(logical_id, definition)| ResourceDescription {
                logical_id: logical_id.clone(),
                physical_id: Some(format!("{}-{}", record.name, logical_id)),
                resource_type: definition.resource_type.clone(),
                status: StackStatus::CreateComplete.to_string(),
            })
            .collect())
    }

    fn get_current_template(&self, stack_id: &str) -> Result<Template> {
        Ok(self.require_record("describe", stack_id)?.template)
    }
}

/// Uploads content as files under a root directory.
#[derive(Debug, Clone)]
pub struct DirUploader {
    root: PathBuf,
}

impl DirUploader {
    pub fn new(root: PathBuf) -> Self {
        DirUploader { root }
    }

    fn destination(&self, key: &str) -> PathBuf {
        self.root.join(UPLOADS_DIRECTORY_NAME).join(key)
    }
}

impl ContentUploader for DirUploader {
    fn upload_content(&self, key: &str, content: &[u8]) -> Result<String> {
        let destination = self.destination(key);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&destination, content)?;
        log::debug!("uploaded {} bytes to {}", content.len(), key);
        Ok(key.to_string())
    }

    fn upload_file(&self, key: &str, path: &Path) -> Result<String> {
        let destination = self.destination(key);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &destination)?;
        log::debug!("uploaded {} to {}", path.display(), key);
        Ok(key.to_string())
    }

    fn upload_directory(&self, key_prefix: &str, directory: &Path) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in walkdir::WalkDir::new(directory).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                Error::provider("upload", format!("{}: {}", directory.display(), error))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(directory)
                .map_err(|error| {
                    Error::provider("upload", format!("{}: {}", entry.path().display(), error))
                })?;
            let key = format!("{}/{}", key_prefix, relative.display());
            self.upload_file(&key, entry.path())?;
            keys.push(key);
        }
        Ok(keys)
    }
}

/// Whole-object storage backed by a directory per bucket.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: PathBuf) -> Self {
        DirObjectStore { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(OBJECTS_DIRECTORY_NAME).join(bucket).join(key)
    }
}

impl ObjectStore for DirObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.object_path(bucket, key)) {
            Ok(body) => Ok(Some(body)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ResourceDefinition;
    use crate::util;
    use serde_json::json;
    use tempfile::TempDir;

    fn template_with_resource(logical_id: &str, resource_type: &str) -> Template {
        let mut template = Template::empty();
        template.resources.insert(
            logical_id.to_string(),
            serde_json::from_value::<ResourceDefinition>(json!({ "Type": resource_type }))
                .unwrap(),
        );
        template
    }

    #[test]
    fn test_create_describe_round_trip() {
        let temp = TempDir::new().unwrap();
        let provider = LocalStackProvider::new(temp.path().to_path_buf());
        let template = template_with_resource("Widget", "AWS::S3::Bucket");

        let stack_id = provider
            .create_stack("dev-widgets", &template, &BTreeMap::new())
            .unwrap();
        assert_eq!(util::stack_name_from_arn(&stack_id).unwrap(), "dev-widgets");

        let description = provider.describe_stack(&stack_id).unwrap().unwrap();
        assert_eq!(description.name, "dev-widgets");
        assert_eq!(description.status, StackStatus::CreateComplete);

        let resources = provider.describe_stack_resources(&stack_id).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].logical_id, "Widget");
        assert_eq!(resources[0].resource_type, "AWS::S3::Bucket");
    }

    #[test]
    fn test_create_rejects_empty_template() {
        let temp = TempDir::new().unwrap();
        let provider = LocalStackProvider::new(temp.path().to_path_buf());
        let err = provider
            .create_stack("dev", &Template::empty(), &BTreeMap::new())
            .unwrap_err();
        assert!(format!("{}", err).contains("at least one Resources member"));
    }

    #[test]
    fn test_update_replaces_template_and_parameters() {
        let temp = TempDir::new().unwrap();
        let provider = LocalStackProvider::new(temp.path().to_path_buf());
        let stack_id = provider
            .create_stack(
                "dev",
                &template_with_resource("A", "AWS::S3::Bucket"),
                &BTreeMap::new(),
            )
            .unwrap();

        let mut parameters = BTreeMap::new();
        parameters.insert("Size".to_string(), "large".to_string());
        provider
            .update_stack(
                &stack_id,
                &template_with_resource("B", "AWS::SQS::Queue"),
                &parameters,
            )
            .unwrap();

        let description = provider.describe_stack(&stack_id).unwrap().unwrap();
        assert_eq!(description.status, StackStatus::UpdateComplete);
        assert_eq!(description.parameters.get("Size").unwrap(), "large");
        let template = provider.get_current_template(&stack_id).unwrap();
        assert!(template.resources.contains_key("B"));
        assert!(!template.resources.contains_key("A"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let provider = LocalStackProvider::new(temp.path().to_path_buf());
        let stack_id = provider
            .create_stack(
                "dev",
                &template_with_resource("A", "AWS::S3::Bucket"),
                &BTreeMap::new(),
            )
            .unwrap();

        provider.delete_stack(&stack_id).unwrap();
        assert!(provider.describe_stack(&stack_id).unwrap().is_none());
        provider.delete_stack(&stack_id).unwrap();
    }

    #[test]
    fn test_update_missing_stack_fails() {
        let temp = TempDir::new().unwrap();
        let provider = LocalStackProvider::new(temp.path().to_path_buf());
        let err = provider
            .update_stack(
                "arn:local:stacks:local:000000000000:stack/gone/abc123",
                &template_with_resource("A", "AWS::S3::Bucket"),
                &BTreeMap::new(),
            )
            .unwrap_err();
        assert!(format!("{}", err).contains("does not exist"));
    }

    #[test]
    fn test_uploader_writes_under_key() {
        let temp = TempDir::new().unwrap();
        let uploader = DirUploader::new(temp.path().to_path_buf());
        let key = uploader
            .upload_content("dev/widgets/resource-template.json", b"{}")
            .unwrap();
        assert_eq!(key, "dev/widgets/resource-template.json");
        let written = temp.path().join("uploads").join(key);
        assert_eq!(fs::read(written).unwrap(), b"{}");
    }

    #[test]
    fn test_uploader_uploads_directory_tree() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("code");
        fs::create_dir_all(source.join("lib")).unwrap();
        fs::write(source.join("main.py"), b"print()").unwrap();
        fs::write(source.join("lib/util.py"), b"# util").unwrap();

        let uploader = DirUploader::new(temp.path().to_path_buf());
        let keys = uploader
            .upload_directory("dev/widgets/lambda-code", &source)
            .unwrap();
        assert_eq!(
            keys,
            vec![
                "dev/widgets/lambda-code/lib/util.py".to_string(),
                "dev/widgets/lambda-code/main.py".to_string(),
            ]
        );
        assert_eq!(
            fs::read(temp.path().join("uploads/dev/widgets/lambda-code/main.py")).unwrap(),
            b"print()"
        );
    }

    #[test]
    fn test_object_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = DirObjectStore::new(temp.path().to_path_buf());
        assert!(store.get_object("bucket", "key.json").unwrap().is_none());
        store.put_object("bucket", "key.json", b"[1,2]").unwrap();
        assert_eq!(
            store.get_object("bucket", "key.json").unwrap().unwrap(),
            b"[1,2]"
        );
    }
}
