//! Default values and fixed file-layout constants for stratus.
//!
//! This module centralizes the persisted-state layout: settings file names,
//! template file names, object-store keys, and the default user directory.
//! Keeping them in one place ensures commands and the library agree on where
//! state lives.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the project-relative directory holding deployment state.
pub const AWS_DIRECTORY_NAME: &str = "AWS";

/// Local project settings file, stored under the project AWS directory.
pub const LOCAL_PROJECT_SETTINGS_FILENAME: &str = "local-project-settings.json";

/// Remote project settings object key in the configuration bucket.
pub const PROJECT_SETTINGS_FILENAME: &str = "project-settings.json";

/// Per-resource-group template file name.
pub const RESOURCE_GROUP_TEMPLATE_FILENAME: &str = "resource-template.json";

/// Deployment-level template file name (base and rendered forms).
pub const DEPLOYMENT_TEMPLATE_FILENAME: &str = "deployment-template.json";

/// Deployment access template file name.
pub const DEPLOYMENT_ACCESS_TEMPLATE_FILENAME: &str = "deployment-access-template.json";

/// Project-level template file name.
pub const PROJECT_TEMPLATE_FILENAME: &str = "project-template.json";

/// Extension template file names, stored in the project AWS directory.
pub const PROJECT_TEMPLATE_EXTENSIONS_FILENAME: &str = "project-template-extensions.json";
pub const DEPLOYMENT_TEMPLATE_EXTENSIONS_FILENAME: &str = "deployment-template-extensions.json";
pub const DEPLOYMENT_ACCESS_TEMPLATE_EXTENSIONS_FILENAME: &str =
    "deployment-access-template-extensions.json";

/// Directory (relative to the AWS directory) holding project-local resource
/// group definitions.
pub const RESOURCE_GROUP_DIRECTORY_NAME: &str = "resource-group";

/// Directory (relative to a resource-group directory) holding per-function
/// code for function resources.
pub const LAMBDA_CODE_DIRECTORY_NAME: &str = "lambda-code";

/// Service API definition file, relative to a resource-group directory.
pub const SWAGGER_FILENAME: &str = "swagger.json";

/// File touched to signal interactive tooling that stack state changed.
pub const GUI_REFRESH_TRIGGER_FILENAME: &str = "gui-refresh-trigger";

/// Best-effort wait before stack-template reads, to allow the object store's
/// eventual consistency to catch up before the stack engine fetches the
/// uploaded template. This is a deliberate, constant delay.
pub const STACK_UPDATE_DELAY: Duration = Duration::from_secs(3);

/// Returns the default user directory for a project root.
///
/// Uses the platform-appropriate data directory:
/// - Linux: `~/.local/share/stratus/<project-name>`
/// - macOS: `~/Library/Application Support/stratus/<project-name>`
///
/// Falls back to `.stratus-user` under the project root if the platform data
/// directory cannot be determined.
///
/// This can be overridden by the `--user-dir` CLI flag or the
/// `STRATUS_USER_DIR` environment variable.
pub fn default_user_directory(root: &std::path::Path) -> PathBuf {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    dirs::data_dir()
        .map(|d| d.join("stratus").join(&project_name))
        .unwrap_or_else(|| root.join(".stratus-user"))
}
