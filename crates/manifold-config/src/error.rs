//! Error types for configuration validation and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // Filesystem validation errors (for CLI use)
    #[error("entry '{path}' of target '{target}' not found")]
    EntryNotFound { target: String, path: PathBuf },

    #[error("asset source directory not found: {path}")]
    SourceDirNotFound { path: PathBuf },

    // Config parsing/loading errors
    #[error("config not found")]
    NotFound,

    #[error("invalid config value in '{field}'")]
    InvalidValue { field: String, hint: Option<String> },

    #[error("invalid profile override: {message}")]
    InvalidProfileOverride { message: String },

    // Schema validation errors (no filesystem checks)
    #[error("no targets declared")]
    NoTargets,

    #[error("target '{target}' has no entries")]
    NoEntries { target: String },

    #[error("schema validation failed: {message}")]
    SchemaValidation {
        message: String,
        hint: Option<String>,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Optional remediation hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { hint, .. } | ConfigError::SchemaValidation { hint, .. } => {
                hint.as_deref()
            }
            ConfigError::NotFound => {
                Some("Create a manifold.toml or add a 'manifold' field to package.json")
            }
            ConfigError::NoTargets => Some("Declare at least one [[targets]] table"),
            _ => None,
        }
    }
}
