//! Structured build diagnostics.
//!
//! Every warning or error a transform produces is a `Diagnostic` with typed
//! fields. Suppression rules match on these fields, never on the rendered
//! message.

use std::fmt;
use std::str::FromStr;

use manifold_graph::{DependencyChain, ModuleId};
use serde::{Deserialize, Serialize};

/// Stable diagnostic code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiagnosticCode {
    MissingExport,
    CircularDependency,
    UnresolvedImport,
    UnresolvedEntry,
    TransformFailed,
    PolicyViolation,
    AssetMissing,
    /// Code raised by a custom transform
    Other(String),
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &str {
        match self {
            DiagnosticCode::MissingExport => "MISSING_EXPORT",
            DiagnosticCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            DiagnosticCode::UnresolvedImport => "UNRESOLVED_IMPORT",
            DiagnosticCode::UnresolvedEntry => "UNRESOLVED_ENTRY",
            DiagnosticCode::TransformFailed => "TRANSFORM_FAILED",
            DiagnosticCode::PolicyViolation => "POLICY_VIOLATION",
            DiagnosticCode::AssetMissing => "ASSET_MISSING",
            DiagnosticCode::Other(code) => code,
        }
    }
}

impl FromStr for DiagnosticCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MISSING_EXPORT" => DiagnosticCode::MissingExport,
            "CIRCULAR_DEPENDENCY" => DiagnosticCode::CircularDependency,
            "UNRESOLVED_IMPORT" => DiagnosticCode::UnresolvedImport,
            "UNRESOLVED_ENTRY" => DiagnosticCode::UnresolvedEntry,
            "TRANSFORM_FAILED" => DiagnosticCode::TransformFailed,
            "POLICY_VIOLATION" => DiagnosticCode::PolicyViolation,
            "ASSET_MISSING" => DiagnosticCode::AssetMissing,
            other => DiagnosticCode::Other(other.to_string()),
        })
    }
}

impl From<String> for DiagnosticCode {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }
}

impl From<DiagnosticCode> for String {
    fn from(value: DiagnosticCode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticSeverity::Info => "info",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Error => "error",
        })
    }
}

/// Structured context for different diagnostic kinds.
///
/// Provides type-safe access to diagnostic-specific information without
/// requiring string parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiagnosticContext {
    /// Context for missing export warnings
    MissingExport {
        /// Name of the missing export
        export_name: String,
        /// Module that requested the export
        importer: String,
        /// Module that was expected to provide it
        exporter: String,
        /// Exports the module does provide
        available_exports: Vec<String>,
    },
    /// Context for circular dependency warnings
    CircularDependency {
        /// Modules in the cycle, closed by repeating the first one
        cycle_path: Vec<String>,
    },
    /// Context for unresolved import warnings
    UnresolvedImport { specifier: String, from_file: String },
    /// Context for unresolved entry errors
    UnresolvedEntry { entry_path: String },
    /// Context for transform failures
    Transform { file_path: String },
    /// Context for resolution policy violations
    Policy { module: String, detail: String },
    /// Context for assets that were never emitted
    Asset { asset_id: String },
}

/// A warning or error raised while building one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: DiagnosticSeverity,
    pub message: String,
    /// Target the diagnostic was raised for; filled in by the chain
    #[serde(default)]
    pub target: String,
    /// Transform that raised it
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub module: Option<ModuleId>,
    /// Package the diagnostic is confined to (e.g. every member of a cycle)
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub context: Option<DiagnosticContext>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            target: String::new(),
            origin: None,
            module: None,
            scope: None,
            context: None,
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, DiagnosticSeverity::Warning, message)
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, DiagnosticSeverity::Error, message)
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, DiagnosticSeverity::Info, message)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_context(mut self, context: DiagnosticContext) -> Self {
        self.context = Some(context);
        self
    }

    /// `importer` asks `exporter` for `name`, which it does not export.
    pub fn missing_export(importer: &ModuleId, exporter: &ModuleId, name: &str, available: &[String]) -> Self {
        let mut diagnostic = Self::warning(
            DiagnosticCode::MissingExport,
            format!("'{name}' is not exported by {exporter}, imported by {importer}"),
        )
        .with_module(importer.clone())
        .with_context(DiagnosticContext::MissingExport {
            export_name: name.to_string(),
            importer: importer.to_string(),
            exporter: exporter.to_string(),
            available_exports: available.to_vec(),
        });
        if let Some(package) = exporter.package_name() {
            diagnostic = diagnostic.with_scope(package);
        }
        diagnostic
    }

    pub fn circular_dependency(chain: &DependencyChain) -> Self {
        let mut diagnostic = Self::warning(
            DiagnosticCode::CircularDependency,
            format!("Circular dependency: {}", chain.format_chain()),
        )
        .with_context(DiagnosticContext::CircularDependency {
            cycle_path: chain.path.iter().map(ToString::to_string).collect(),
        });
        if let Some(first) = chain.first() {
            diagnostic = diagnostic.with_module(first.clone());
        }
        if let Some(package) = chain.common_package() {
            diagnostic = diagnostic.with_scope(package);
        }
        diagnostic
    }

    pub fn unresolved_import(specifier: &str, importer: &ModuleId) -> Self {
        Self::warning(
            DiagnosticCode::UnresolvedImport,
            format!("'{specifier}' is imported by {importer}, but could not be resolved; treating it as an external dependency"),
        )
        .with_module(importer.clone())
        .with_context(DiagnosticContext::UnresolvedImport {
            specifier: specifier.to_string(),
            from_file: importer.to_string(),
        })
    }

    pub fn unresolved_entry(entry: &str) -> Self {
        Self::error(
            DiagnosticCode::UnresolvedEntry,
            format!("Could not resolve entry module '{entry}'"),
        )
        .with_context(DiagnosticContext::UnresolvedEntry {
            entry_path: entry.to_string(),
        })
    }

    pub fn transform_failed(module: &ModuleId, message: impl Into<String>) -> Self {
        Self::error(DiagnosticCode::TransformFailed, message)
            .with_module(module.clone())
            .with_context(DiagnosticContext::Transform {
                file_path: module.to_string(),
            })
    }

    /// Export name carried by a `MISSING_EXPORT` diagnostic.
    pub fn export_name(&self) -> Option<&str> {
        match &self.context {
            Some(DiagnosticContext::MissingExport { export_name, .. }) => Some(export_name),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.target.is_empty() {
            write!(f, "[{}] ", self.target)?;
        }
        write!(f, "{} {}: {}", self.severity, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> ModuleId {
        ModuleId::new(path).unwrap()
    }

    #[test]
    fn codes_round_trip_through_strings() {
        assert_eq!("MISSING_EXPORT".parse::<DiagnosticCode>().unwrap(), DiagnosticCode::MissingExport);
        assert_eq!(
            "SVELTE_A11Y".parse::<DiagnosticCode>().unwrap(),
            DiagnosticCode::Other("SVELTE_A11Y".into())
        );
        let json = serde_json::to_string(&DiagnosticCode::CircularDependency).unwrap();
        assert_eq!(json, "\"CIRCULAR_DEPENDENCY\"");
    }

    #[test]
    fn circular_dependency_is_scoped_to_its_package() {
        let chain = DependencyChain::new(vec![
            id("node_modules/@framework/internal/a.mjs"),
            id("node_modules/@framework/internal/b.mjs"),
            id("node_modules/@framework/internal/a.mjs"),
        ]);
        let diagnostic = Diagnostic::circular_dependency(&chain);
        assert_eq!(diagnostic.code, DiagnosticCode::CircularDependency);
        assert_eq!(diagnostic.scope.as_deref(), Some("@framework/internal"));
        assert_eq!(diagnostic.severity, DiagnosticSeverity::Warning);

        let mixed = DependencyChain::new(vec![id("src/a.js"), id("src/b.js"), id("src/a.js")]);
        assert_eq!(Diagnostic::circular_dependency(&mixed).scope, None);
    }

    #[test]
    fn missing_export_carries_export_name() {
        let diagnostic = Diagnostic::missing_export(
            &id("src/routes/index.svelte"),
            &id("src/routes/_layout.js"),
            "preload",
            &["default".to_string()],
        );
        assert_eq!(diagnostic.export_name(), Some("preload"));
        assert_eq!(diagnostic.module, Some(id("src/routes/index.svelte")));
        assert!(diagnostic.to_string().contains("MISSING_EXPORT"));
    }

    #[test]
    fn context_serializes_with_type_tag() {
        let diagnostic = Diagnostic::unresolved_entry("src/missing.js").with_target("client");
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["context"]["type"], "UnresolvedEntry");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["target"], "client");
    }
}
