//! End-to-end tests for the `init` command.
//!
//! These tests invoke the actual CLI binary and validate `init` behavior
//! from a user's perspective: the AWS directory layout it creates and the
//! errors for repeated or missing initialization.

mod common;
use common::prelude::*;

#[test]
fn test_init_creates_aws_directory_layout() {
    let fixture = ProjectFixture::new();

    fixture
        .command()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized project at"))
        .stdout(predicate::str::contains("stratus project create"));

    let aws = fixture.aws_dir();
    assert!(aws.join("project-template.json").is_file());
    assert!(aws.join("deployment-template.json").is_file());
    assert!(aws.join("deployment-access-template.json").is_file());
    assert!(aws.join("local-project-settings.json").is_file());
}

#[test]
fn test_init_twice_fails() {
    let fixture = ProjectFixture::new().initialized();

    fixture
        .command()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already been initialized"));
}

#[test]
fn test_commands_require_initialization() {
    let fixture = ProjectFixture::new();

    fixture
        .command()
        .arg("resource-group")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("has not been initialized"));

    fixture
        .command()
        .arg("deployment")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("has not been initialized"));
}

#[test]
fn test_project_create_requires_initialization() {
    let fixture = ProjectFixture::new();

    fixture
        .command()
        .arg("project")
        .arg("create")
        .arg("--confirm-aws-usage")
        .assert()
        .failure()
        .stderr(predicate::str::contains("has not been initialized"));
}
