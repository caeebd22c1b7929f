//! # Stratus Library
//!
//! Core functionality for the `stratus` deployment tool: a three-tier stack
//! orchestration engine that keeps a project's cloud infrastructure in sync
//! with its on-disk templates. It is designed to be driven by the `stratus`
//! command-line tool but can be embedded by other applications that need
//! programmatic stack orchestration.
//!
//! ## Core Concepts
//!
//! - **Templates (`template`, `aggregator`)**: JSON infrastructure templates,
//!   merged from a base plus an optional extension file into one effective
//!   template with non-override and access-control invariants enforced.
//! - **Settings (`settings`)**: the hierarchical deployment settings tree,
//!   persisted locally under the project's AWS directory and remotely in the
//!   project's configuration bucket, with two-phase stack-id commits.
//! - **Resource Groups (`resource_group`)**: independently deployable
//!   resource bundles, each becoming a nested stack under a deployment.
//! - **Change Detection (`pending`)**: classifies every resource as pending
//!   create, update or delete before an operation, and derives which
//!   confirmation flags the operation requires.
//! - **Orchestration (`orchestrator`)**: sequences confirm, upload, hook and
//!   provider calls for project, deployment and resource-group operations,
//!   always patching a parent template rather than driving a nested stack
//!   directly.
//! - **Providers (`provider`)**: the collaborator seams for stack lifecycle,
//!   content upload and object storage, with file-backed implementations
//!   for offline use and testing.
//!
//! ## Execution Flow
//!
//! A typical operation runs: build the [`project::Project`] context, render
//! the effective template, resolve pending status against the live stack,
//! pass the confirmation gate, upload artifacts, then issue exactly one
//! provider call and finalize any pending stack ids.

pub mod aggregator;
pub mod defaults;
pub mod error;
pub mod orchestrator;
pub mod pending;
pub mod project;
pub mod provider;
pub mod resource_group;
pub mod settings;
pub mod template;
pub mod util;
pub mod view;
