//! High-level configuration structure for Manifold.
//!
//! This module provides the main `ManifoldConfig` struct and profile merging
//! logic. For file discovery, see the `discovery` module.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnostics::DiagnosticsConfig;
use crate::error::{ConfigError, Result as ConfigResult};
use crate::settings::GlobalSettings;
use crate::target::TargetConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifoldConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,

    #[serde(default)]
    pub settings: GlobalSettings,
}

/// Overrides applied when a profile (normally the build mode) is selected.
///
/// ```toml
/// [profiles.production.targets.client.output]
/// file = "client.min.js"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Per-target overrides keyed by target name
    #[serde(default)]
    pub targets: IndexMap<String, Value>,

    #[serde(default)]
    pub diagnostics: Value,

    #[serde(default)]
    pub settings: Value,
}

impl ManifoldConfig {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use manifold_config::ManifoldConfig;
    /// use serde_json::json;
    ///
    /// let value = json!({
    ///     "targets": [
    ///         { "name": "client", "entries": ["src/client.js"] }
    ///     ]
    /// });
    ///
    /// let config = ManifoldConfig::from_value(value).unwrap();
    /// assert_eq!(config.targets[0].entries, vec!["src/client.js".to_string()]);
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|target| target.name == name)
    }

    /// Merge the overrides of `profile` into the base configuration.
    ///
    /// Unknown profiles leave the configuration untouched. Overrides for
    /// targets that are not declared are rejected.
    pub fn materialize_profile(mut self, profile: Option<&str>) -> ConfigResult<Self> {
        let Some(name) = profile else {
            return Ok(self);
        };
        let Some(profile_cfg) = self.profiles.get(name).cloned() else {
            return Ok(self);
        };

        for (target_name, overrides) in &profile_cfg.targets {
            if overrides.is_null() {
                continue;
            }
            let target = self
                .targets
                .iter_mut()
                .find(|target| &target.name == target_name)
                .ok_or_else(|| ConfigError::InvalidProfileOverride {
                    message: format!(
                        "profile '{name}' overrides unknown target '{target_name}'"
                    ),
                })?;
            *target = merge_into(&*target, overrides)?;
        }

        if !profile_cfg.diagnostics.is_null() {
            self.diagnostics = merge_into(&self.diagnostics, &profile_cfg.diagnostics)?;
        }

        if !profile_cfg.settings.is_null() {
            self.settings = merge_into(&self.settings, &profile_cfg.settings)?;
        }

        Ok(self)
    }
}

fn merge_into<T>(base: &T, overrides: &Value) -> ConfigResult<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let mut merged = serde_json::to_value(base).map_err(|err| {
        ConfigError::InvalidProfileOverride {
            message: err.to_string(),
        }
    })?;
    merge_values(&mut merged, overrides);
    serde_json::from_value(merged).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })
}

/// Deep-merge `update` into `target`. Objects merge key by key; arrays and
/// scalars replace.
pub fn merge_values(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_values(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target_slot, _) => {
            *target_slot = update.clone();
        }
    }
}
