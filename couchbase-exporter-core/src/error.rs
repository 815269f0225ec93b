//! Error types for metric definition loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading metric definitions or building a registry.
///
/// All of these are fatal for the affected domain: its collector cannot be
/// constructed.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No definition resource exists for the domain.
    #[error("No metric definitions found for domain '{domain}'")]
    NotFound { domain: String },

    /// The definition resource could not be read.
    #[error("Failed to read metric definitions from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The definition resource is not valid JSON or does not match the schema.
    #[error("Malformed metric definitions for domain '{domain}': {source}")]
    Malformed {
        domain: String,
        #[source]
        source: serde_json::Error,
    },

    /// The resource declares a different domain than the one requested.
    #[error("Metric definitions for domain '{expected}' declare domain '{found}'")]
    DomainMismatch { expected: String, found: String },

    /// Two definitions share the same id.
    #[error("Duplicate metric id '{id}' in domain '{domain}'")]
    DuplicateId { domain: String, id: String },

    /// Two definitions export the same metric name.
    #[error("Duplicate metric name '{name}' in domain '{domain}'")]
    DuplicateName { domain: String, name: String },

    /// A definition uses a name owned by the domain collector.
    #[error("Metric name '{name}' in domain '{domain}' is reserved")]
    ReservedName { domain: String, name: String },

    /// A required field is empty.
    #[error("Empty {field} in metric definitions for domain '{domain}'")]
    EmptyField { domain: String, field: String },

    /// A metric or label name is not a valid Prometheus identifier.
    #[error("Invalid {kind} name '{name}' in domain '{domain}'")]
    InvalidName {
        domain: String,
        kind: &'static str,
        name: String,
    },

    /// A descriptor declares labels the domain cannot provide.
    #[error("Metric '{id}' in domain '{domain}' declares labels {declared:?}, expected {expected:?}")]
    LabelMismatch {
        domain: String,
        id: String,
        declared: Vec<String>,
        expected: Vec<String>,
    },
}

impl LoadError {
    pub(crate) fn empty(domain: &str, field: impl Into<String>) -> Self {
        Self::EmptyField {
            domain: domain.to_string(),
            field: field.into(),
        }
    }

    pub(crate) fn invalid_name(domain: &str, kind: &'static str, name: &str) -> Self {
        Self::InvalidName {
            domain: domain.to_string(),
            kind,
            name: name.to_string(),
        }
    }
}

/// Result type alias using [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
