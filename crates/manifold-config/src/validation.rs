//! Pluggable config validation strategies
//!
//! Separates filesystem validation (for CLI use) from schema validation (for library use).
//! Deeper checks that need the bundler (transform names, substitution tokens,
//! chain kinds) happen when the orchestrator plans the build.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::ManifoldConfig;
use crate::error::{ConfigError, Result};

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    fn validate(&self, config: &ManifoldConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// # Example
///
/// ```
/// use manifold_config::{ConfigValidator, ManifoldConfig, SchemaValidator, TargetConfig};
///
/// let mut client = TargetConfig::new("client");
/// client.entries = vec!["src/client.js".into()];
///
/// let config = ManifoldConfig { targets: vec![client], ..Default::default() };
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &ManifoldConfig) -> Result<()> {
        if config.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let mut names = HashSet::new();
        for target in &config.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "target names cannot be empty".to_string(),
                    hint: Some("Give every [[targets]] table a 'name'".to_string()),
                });
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::SchemaValidation {
                    message: format!("target '{}' is declared twice", target.name),
                    hint: Some("Target names must be unique".to_string()),
                });
            }
            if target.entries.is_empty() {
                return Err(ConfigError::NoEntries {
                    target: target.name.clone(),
                });
            }

            for external in &target.externals {
                if external.id().trim().is_empty() {
                    return Err(ConfigError::SchemaValidation {
                        message: format!("target '{}' has an empty external", target.name),
                        hint: Some("Remove empty strings from 'externals'".to_string()),
                    });
                }
            }

            for transform in &target.transforms {
                if transform.name.trim().is_empty() {
                    return Err(ConfigError::SchemaValidation {
                        message: format!("target '{}' has an unnamed transform", target.name),
                        hint: Some("Set 'name' on every [[targets.transforms]] entry".to_string()),
                    });
                }
            }
        }

        for (idx, rule) in config.diagnostics.suppress.iter().enumerate() {
            if rule.is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: format!("suppression rule #{} matches every diagnostic", idx + 1),
                    hint: Some(
                        "Set at least one of code, export, within, target or origin".to_string(),
                    ),
                });
            }
            if let Some(target) = &rule.target {
                if !names.contains(target.as_str()) {
                    return Err(ConfigError::SchemaValidation {
                        message: format!(
                            "suppression rule #{} refers to unknown target '{target}'",
                            idx + 1
                        ),
                        hint: None,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Filesystem validator (for CLI use)
///
/// Validates that entry points and asset source directories exist on disk.
pub struct FsValidator {
    root: PathBuf,
}

impl FsValidator {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &ManifoldConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        for target in &config.targets {
            for entry in &target.entries {
                let path = self.root.join(entry);
                if !path.is_file() {
                    return Err(ConfigError::EntryNotFound {
                        target: target.name.clone(),
                        path,
                    });
                }
            }

            for transform in &target.transforms {
                let Some(dir) = transform.options.get("source_dir").and_then(|v| v.as_str())
                else {
                    continue;
                };
                let path = self.root.join(dir);
                if !path.is_dir() {
                    return Err(ConfigError::SourceDirNotFound { path });
                }
            }
        }

        Ok(())
    }
}

/// Convenience function for schema-only validation
pub fn validate_schema(config: &ManifoldConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

/// Convenience function for filesystem validation
pub fn validate_fs(config: &ManifoldConfig, root: impl AsRef<Path>) -> Result<()> {
    FsValidator::new(root).validate(config)
}
