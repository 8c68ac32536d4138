//! File-based config discovery for CLI use
//!
//! Handles finding and loading Manifold configuration files from the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::ManifoldConfig;
use crate::error::{ConfigError, Result};

const TOML_FILE: &str = "manifold.toml";
const PACKAGE_FIELD: &str = "manifold";

/// File-based configuration discovery
///
/// Library users should prefer `ManifoldConfig::from_value()`.
///
/// # Example
///
/// ```no_run
/// use manifold_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory
    ///
    /// Searches in this order:
    /// 1. TOML config: manifold.toml
    /// 2. package.json (manifold field)
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(TOML_FILE);
        if toml_path.is_file() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed = serde_json::from_str::<Value>(&content).ok()?;
        match parsed.get(PACKAGE_FIELD) {
            Some(field) if !field.is_null() => Some(pkg_path),
            _ => None,
        }
    }

    /// Load config from discovered file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<ManifoldConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        load_file(&path)
    }

    /// Load config with profile merging
    pub fn load_with_profile(&self, profile: &str) -> Result<ManifoldConfig> {
        self.load()?.materialize_profile(Some(profile))
    }
}

/// Load config from an explicit file (`*.toml` or `package.json`).
pub fn load_file(path: &Path) -> Result<ManifoldConfig> {
    debug!(path = %path.display(), "loading configuration");

    if path.file_name() == Some(std::ffi::OsStr::new("package.json")) {
        return load_from_package_json(path);
    }

    let content = fs::read_to_string(path)?;

    let toml_val: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::InvalidValue {
        field: "toml".to_string(),
        hint: Some(format!("Invalid TOML syntax: {}", e)),
    })?;

    let value = serde_json::to_value(toml_val).map_err(|e| ConfigError::InvalidValue {
        field: "toml".to_string(),
        hint: Some(format!("TOML to JSON conversion failed: {}", e)),
    })?;

    ManifoldConfig::from_value(value)
}

fn load_from_package_json(path: &Path) -> Result<ManifoldConfig> {
    let content = fs::read_to_string(path)?;

    let parsed: Value = serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
        field: "package.json".to_string(),
        hint: Some(format!("Invalid JSON: {}", e)),
    })?;

    match parsed.get(PACKAGE_FIELD) {
        Some(value) if !value.is_null() => ManifoldConfig::from_value(value.clone()),
        _ => Err(ConfigError::InvalidValue {
            field: PACKAGE_FIELD.to_string(),
            hint: Some("Add a 'manifold' field to your package.json".to_string()),
        }),
    }
}

/// Discover and load config from the current directory.
pub fn discover() -> Result<ManifoldConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}

/// Discover and load config from the current directory with a profile.
pub fn discover_with_profile(profile: &str) -> Result<ManifoldConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load_with_profile(profile)
}
