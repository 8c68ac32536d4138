//! Diagnostic routing: suppression first, then severity escalation.
//!
//! The router is a pure function of a diagnostic's fields. It holds no
//! mutable state, so every target task shares one `Arc<DiagnosticRouter>`
//! without locking.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSeverity};

type Predicate = Arc<dyn Fn(&Diagnostic) -> bool + Send + Sync>;

/// Named predicate over a diagnostic.
#[derive(Clone)]
pub struct SuppressionRule {
    name: String,
    matcher: Matcher,
}

#[derive(Clone)]
enum Matcher {
    MissingExport(String),
    CircularWithin(String),
    Fields(FieldMatcher),
    Custom(Predicate),
}

/// Matches diagnostics field by field; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMatcher {
    pub code: Option<DiagnosticCode>,
    /// Export name of a `MISSING_EXPORT` diagnostic
    pub export: Option<String>,
    /// Package scope, sub-scopes included
    pub within: Option<String>,
    pub target: Option<String>,
    /// Transform that raised the diagnostic
    pub origin: Option<String>,
}

impl FieldMatcher {
    pub fn matches(&self, diagnostic: &Diagnostic) -> bool {
        if self.code.as_ref().is_some_and(|code| *code != diagnostic.code) {
            return false;
        }
        if let Some(export) = &self.export {
            if diagnostic.export_name() != Some(export.as_str()) {
                return false;
            }
        }
        if let Some(package) = &self.within {
            if !scope_within(diagnostic.scope.as_deref(), package) {
                return false;
            }
        }
        if self.target.as_ref().is_some_and(|target| *target != diagnostic.target) {
            return false;
        }
        if let Some(origin) = &self.origin {
            if diagnostic.origin.as_deref() != Some(origin.as_str()) {
                return false;
            }
        }
        true
    }
}

fn scope_within(scope: Option<&str>, package: &str) -> bool {
    match scope {
        Some(scope) => {
            scope == package
                || scope
                    .strip_prefix(package)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => false,
    }
}

impl SuppressionRule {
    /// `MISSING_EXPORT` diagnostics for the export `name`.
    pub fn missing_export(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: format!("missing_export({name})"),
            matcher: Matcher::MissingExport(name),
        }
    }

    /// `CIRCULAR_DEPENDENCY` diagnostics confined to `package`.
    pub fn circular_within(package: impl Into<String>) -> Self {
        let package = package.into();
        Self {
            name: format!("circular_within({package})"),
            matcher: Matcher::CircularWithin(package),
        }
    }

    pub fn fields(name: impl Into<String>, matcher: FieldMatcher) -> Self {
        Self {
            name: name.into(),
            matcher: Matcher::Fields(matcher),
        }
    }

    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Diagnostic) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: Matcher::Custom(Arc::new(predicate)),
        }
    }

    /// Give the rule a different name in telemetry.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, diagnostic: &Diagnostic) -> bool {
        match &self.matcher {
            Matcher::MissingExport(name) => {
                diagnostic.code == DiagnosticCode::MissingExport
                    && diagnostic.export_name() == Some(name.as_str())
            }
            Matcher::CircularWithin(package) => {
                diagnostic.code == DiagnosticCode::CircularDependency
                    && scope_within(diagnostic.scope.as_deref(), package)
            }
            Matcher::Fields(fields) => fields.matches(diagnostic),
            Matcher::Custom(predicate) => predicate(diagnostic),
        }
    }
}

impl fmt::Debug for SuppressionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.matcher {
            Matcher::MissingExport(_) => "missing_export",
            Matcher::CircularWithin(_) => "circular_within",
            Matcher::Fields(_) => "fields",
            Matcher::Custom(_) => "custom",
        };
        f.debug_struct("SuppressionRule")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// Outcome of routing one diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Suppressed { rule: String },
    Reported(DiagnosticSeverity),
}

impl RouteDecision {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RouteDecision::Reported(DiagnosticSeverity::Error))
    }
}

/// Ordered suppression rules plus escalation settings for one invocation.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticRouter {
    rules: Vec<SuppressionRule>,
    escalate: FxHashSet<DiagnosticCode>,
    warnings_as_errors: bool,
}

impl DiagnosticRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; earlier rules win.
    pub fn with_rule(mut self, rule: SuppressionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn escalate(mut self, code: DiagnosticCode) -> Self {
        self.escalate.insert(code);
        self
    }

    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn rules(&self) -> &[SuppressionRule] {
        &self.rules
    }

    /// Decide what happens to `diagnostic`.
    ///
    /// The first matching rule suppresses it. Unsuppressed diagnostics are
    /// raised to error when their code is escalated, or when they are
    /// warnings and `warnings_as_errors` is set.
    pub fn route(&self, diagnostic: &Diagnostic) -> RouteDecision {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(diagnostic)) {
            return RouteDecision::Suppressed {
                rule: rule.name().to_string(),
            };
        }

        let escalated = self.escalate.contains(&diagnostic.code)
            || (self.warnings_as_errors && diagnostic.severity == DiagnosticSeverity::Warning);
        if escalated {
            RouteDecision::Reported(DiagnosticSeverity::Error)
        } else {
            RouteDecision::Reported(diagnostic.severity)
        }
    }
}
