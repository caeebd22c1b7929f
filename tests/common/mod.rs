//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures and helper functions to reduce
//! duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = ProjectFixture::new().initialized();
//!     fixture.command().arg("deployment").arg("list").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::PathBuf;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::Command;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::templates;
    pub use super::ProjectFixture;
}

/// Common template JSON snippets for testing.
#[allow(dead_code)]
pub mod templates {
    /// A group template with one plain storage resource.
    pub const BUCKET_ONLY: &str = r#"{
    "AWSTemplateFormatVersion": "2010-09-09",
    "Resources": {
        "Items": { "Type": "AWS::S3::Bucket" }
    }
}"#;

    /// A group template with a parameterized resource.
    pub const WITH_PARAMETER: &str = r#"{
    "AWSTemplateFormatVersion": "2010-09-09",
    "Parameters": {
        "ReadCapacity": { "Type": "Number", "Default": 1 }
    },
    "Resources": {
        "Table": {
            "Type": "AWS::DynamoDB::Table",
            "Properties": { "ReadCapacity": { "Ref": "ReadCapacity" } }
        }
    }
}"#;

    /// Invalid JSON for error testing.
    pub const INVALID_JSON: &str = "{not valid json";
}

/// A test fixture providing a project directory and an isolated per-user
/// directory, so provider state never leaks between tests.
///
/// The project directory is named `game`, giving the stacks predictable
/// `game-*` names.
pub struct ProjectFixture {
    temp_dir: assert_fs::TempDir,
}

impl ProjectFixture {
    /// Create a new fixture with an empty project directory.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("game")
            .create_dir_all()
            .expect("Failed to create project directory");
        Self { temp_dir }
    }

    /// The project root directory.
    pub fn project_dir(&self) -> PathBuf {
        self.temp_dir.path().join("game")
    }

    /// The per-user state directory.
    pub fn user_dir(&self) -> PathBuf {
        self.temp_dir.path().join("user")
    }

    /// The project's AWS directory.
    pub fn aws_dir(&self) -> PathBuf {
        self.project_dir().join("AWS")
    }

    /// A `stratus` command pointed at this fixture's directories.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("stratus").expect("binary exists");
        cmd.arg("--project-dir")
            .arg(self.project_dir())
            .env("STRATUS_USER_DIR", self.user_dir());
        cmd
    }

    /// Runs `init`, asserting success.
    pub fn initialized(self) -> Self {
        self.command().arg("init").assert().success();
        self
    }

    /// Runs `resource-group add <name>`, asserting success.
    #[allow(dead_code)]
    pub fn with_group(self, name: &str) -> Self {
        self.command()
            .arg("resource-group")
            .arg("add")
            .arg(name)
            .assert()
            .success();
        self
    }

    /// Overwrites a group's template file.
    #[allow(dead_code)]
    pub fn write_group_template(&self, name: &str, content: &str) {
        let path = self
            .aws_dir()
            .join("resource-group")
            .join(name)
            .join("resource-template.json");
        std::fs::create_dir_all(path.parent().unwrap()).expect("Failed to create group directory");
        std::fs::write(path, content).expect("Failed to write group template");
    }

    /// Runs `project create` with the usage confirmation, asserting success.
    #[allow(dead_code)]
    pub fn with_project_stack(self) -> Self {
        self.command()
            .arg("project")
            .arg("create")
            .arg("--confirm-aws-usage")
            .assert()
            .success();
        self
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}
