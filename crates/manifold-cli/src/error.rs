//! CLI error types and their conversion to `miette` reports.

use std::path::PathBuf;

use manifold_bundler::{ConfigurationError, GateError, TransformError};
use miette::Report;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading or validating the configuration file failed
    #[error("{0}")]
    Config(#[from] manifold_config::ConfigError),

    /// The targets derived from the configuration are inconsistent
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("target '{target}': transform '{transform}' has an invalid `enabled` condition")]
    InvalidGate {
        target: String,
        transform: String,
        #[source]
        source: GateError,
    },

    #[error("target '{target}': {source}")]
    Transform {
        target: String,
        #[source]
        source: TransformError,
    },

    /// `--target` names a target the configuration does not declare
    #[error("unknown target '{name}'")]
    UnknownTarget { name: String, available: Vec<String> },

    /// Invocation options from the environment or flags are malformed
    #[error("invalid invocation options: {0}")]
    Options(#[from] figment::Error),

    #[error("failed to load the source graph: {0}")]
    Graph(#[from] manifold_graph::GraphError),

    /// An output path would leave the output directory
    #[error("output path '{}' escapes the output directory '{}'", .path.display(), .out_dir.display())]
    OutputEscapes { path: PathBuf, out_dir: PathBuf },

    #[error("failed to write build output")]
    Write(#[source] anyhow::Error),

    /// Some targets failed; the others were written
    #[error("{failed} of {total} targets failed")]
    BuildFailed { failed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

impl CliError {
    /// Optional remediation hint for the user.
    pub fn hint(&self) -> Option<String> {
        match self {
            CliError::Config(err) => err.hint().map(str::to_string),
            CliError::InvalidGate { .. } => Some(
                "Use true/false or combine production, development, legacy with !, && and ||".to_string(),
            ),
            CliError::UnknownTarget { available, .. } => Some(format!("Declared targets: {}", available.join(", "))),
            CliError::Options(_) => Some("MANIFOLD_MODE takes development or production; MANIFOLD_LEGACY takes true or false".to_string()),
            CliError::BuildFailed { .. } => Some("Outputs of the successful targets were still written".to_string()),
            _ => None,
        }
    }
}

/// Convert a `CliError` to a `miette` report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Configuration(err) => Report::new(err),
        CliError::Write(err) => miette::miette!("failed to write build output: {err:#}"),
        other => match other.hint() {
            Some(hint) => miette::miette!(help = hint, "{other}"),
            None => miette::miette!("{other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_keep_their_hint() {
        let err = CliError::from(manifold_config::ConfigError::NotFound);
        assert!(err.hint().is_some_and(|hint| hint.contains("manifold.toml")));
    }

    #[test]
    fn unknown_target_lists_the_declared_ones() {
        let err = CliError::UnknownTarget {
            name: "edge".into(),
            available: vec!["client".into(), "server".into()],
        };
        assert_eq!(err.to_string(), "unknown target 'edge'");
        assert_eq!(err.hint().as_deref(), Some("Declared targets: client, server"));
    }

    #[test]
    fn configuration_errors_become_diagnostics() {
        let report = cli_error_to_miette(CliError::from(ConfigurationError::DuplicateTarget {
            name: "client".into(),
        }));
        assert_eq!(report.code().map(|code| code.to_string()).as_deref(), Some("DUPLICATE_TARGET"));
    }
}
