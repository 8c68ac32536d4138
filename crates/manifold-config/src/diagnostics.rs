//! `[diagnostics]` table: suppression and escalation rules.

use serde::{Deserialize, Serialize};

/// Routing rules shared by every target of a run.
///
/// ```toml
/// [diagnostics]
/// escalate = ["UNRESOLVED_IMPORT"]
///
/// [[diagnostics.suppress]]
/// code = "MISSING_EXPORT"
/// export = "preload"
///
/// [[diagnostics.suppress]]
/// code = "CIRCULAR_DEPENDENCY"
/// within = "@framework/internal"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Suppression rules, evaluated in order; first match wins
    #[serde(default)]
    pub suppress: Vec<SuppressionConfig>,

    /// Diagnostic codes raised to error severity
    #[serde(default)]
    pub escalate: Vec<String>,

    #[serde(default)]
    pub warnings_as_errors: bool,
}

/// A suppression rule. Every field that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// Rule name used in telemetry; derived from the matchers when absent
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    /// Export name carried by MISSING_EXPORT diagnostics
    #[serde(default)]
    pub export: Option<String>,

    /// Package scope (the scope itself or any sub-scope)
    #[serde(default)]
    pub within: Option<String>,

    #[serde(default)]
    pub target: Option<String>,

    /// Transform that emitted the diagnostic
    #[serde(default)]
    pub origin: Option<String>,
}

impl SuppressionConfig {
    /// Returns `true` when no matcher is set (the rule would match everything).
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.export.is_none()
            && self.within.is_none()
            && self.target.is_none()
            && self.origin.is_none()
    }
}
