//! Shared helpers: stack-name validation, stack ARN parsing, and JSON
//! file I/O with the lenient/strict semantics the settings and template
//! stores rely on.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Maximum length accepted for stack and resource-group names.
pub const MAX_STACK_NAME_LENGTH: usize = 128;

fn stack_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Case-insensitive: letters, digits and hyphens, starting with a letter.
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z][a-z0-9-]*$").unwrap())
}

/// Validates that a name is usable as a stack or resource-group name.
///
/// Names must start with a letter, contain only letters, digits and hyphens
/// (case-insensitive), and be at most 128 characters long.
///
/// # Errors
///
/// Returns `Error::Usage` with a distinct message for empty names, names
/// that are too long, and names with invalid characters.
pub fn validate_stack_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::usage("No valid name provided"));
    }
    if name.len() > MAX_STACK_NAME_LENGTH {
        return Err(Error::usage(format!(
            "Name is {} characters, limit {}: {}",
            name.len(),
            MAX_STACK_NAME_LENGTH,
            name
        )));
    }
    if !stack_name_regex().is_match(name) {
        return Err(Error::usage(format!(
            "Stack name can only consist of letters, numbers and hyphens and must start with a letter: {}",
            name
        )));
    }
    Ok(())
}

// Stack ARN format: arn:aws:cloudformation:{region}:{account}:stack/{name}/{guid}

/// Extracts the stack name from a stack ARN.
pub fn stack_name_from_arn(arn: &str) -> Option<&str> {
    arn.split('/').nth(1)
}

/// Extracts the region from a stack ARN.
pub fn region_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(3)
}

/// Extracts the account id from a stack ARN.
pub fn account_id_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(4)
}

/// Renders a parameter value the way the stack provider expects: strings
/// pass through unquoted, everything else as compact JSON.
pub fn parameter_value_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads a JSON file into a deserializable value.
///
/// When `required` is false and the file does not exist, returns `Ok(None)`.
/// A file that exists but cannot be read or parsed is always an error; the
/// caller decides whether that is fatal or sets a lenient load-error flag.
pub fn load_json<T: DeserializeOwned>(path: &Path, required: bool) -> Result<Option<T>> {
    if !path.is_file() {
        if required {
            return Err(Error::config(format!(
                "Could not load {}. The file does not exist.",
                path.display()
            )));
        }
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Could not load {}: {}", path.display(), e))
    })?;
    let value = serde_json::from_str(&content).map_err(|e| {
        Error::config_with_hint(
            format!("Could not load {}: {}", path.display(), e),
            "make sure the file is a valid JSON document",
        )
    })?;
    Ok(Some(value))
}

/// Writes a value to a file as pretty-printed JSON, creating parent
/// directories first. Serialization of map-backed types is key-sorted.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)
        .map_err(|e| Error::config(format!("Could not save {}: {}", path.display(), e)))
}
