//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `stratus` application. It uses the `thiserror` library to create a
//! comprehensive `Error` enum covering all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! ## Taxonomy
//!
//! - **`Config`**: malformed or invalid JSON, schema violations, template
//!   merge collisions, missing mandatory template fields. Always fatal and
//!   user-facing; never retried.
//!
//! - **`Usage`**: missing confirmation flags, unknown deployment or
//!   resource-group names, invalid stack name formats. Fatal and user-facing
//!   with a distinct message per case.
//!
//! - **`Provider`**: failures reported by the external stack engine, content
//!   store, or object store. Not handled in-core; propagated to the caller
//!   after any mandatory refresh signal has been emitted.
//!
//! - **`State`**: internal bookkeeping inconsistencies such as finalizing a
//!   deployment that was never fully created, or a required resource missing
//!   from an otherwise-initialized project stack. Treated as a sign of
//!   manual template tampering and reported with a pointer to the suspected
//!   file or resource.
//!
//! All offline-computable invariants (name formats, merge conflicts,
//! dependency-target existence) are validated before any external call is
//! made, so `Config` and `Usage` errors never leave partial remote state
//! behind.

use thiserror::Error;

/// Main error type for stratus operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration artifact (template, settings file, validation rules)
    /// is malformed or violates a structural invariant.
    ///
    /// Includes the specific issue and optionally a hint about how to fix it.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// The command was invoked incorrectly: unknown names, invalid stack
    /// name format, or a missing confirmation flag for a risky operation.
    #[error("Usage error: {message}")]
    Usage { message: String },

    /// An operation against an external collaborator (stack engine, content
    /// store, object store) failed. These are propagated unchanged.
    #[error("Provider error during {operation}: {message}")]
    Provider { operation: String, message: String },

    /// Persisted bookkeeping contradicts itself, typically a sign that a
    /// settings file or template was modified by hand.
    #[error("State inconsistency: {message}")]
    State { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing or serialization error, wrapped from `serde_json`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a `Config` error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a `Config` error with a hint.
    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Shorthand for a `Usage` error.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
        }
    }

    /// Shorthand for a `Provider` error.
    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a `State` error.
    pub fn state(message: impl Into<String>) -> Self {
        Error::State {
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
