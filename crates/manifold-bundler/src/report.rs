//! The aggregated result of one invocation.

use indexmap::IndexMap;

use crate::TargetFailure;
use crate::artifact::Bundle;
use crate::assets::EmittedAsset;
use crate::diagnostics::{Diagnostic, DiagnosticSeverity};

/// What happened to one target.
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    Built(Bundle),
    Failed(TargetFailure),
}

impl TargetOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, TargetOutcome::Built(_))
    }

    pub fn bundle(&self) -> Option<&Bundle> {
        match self {
            TargetOutcome::Built(bundle) => Some(bundle),
            TargetOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TargetFailure> {
        match self {
            TargetOutcome::Built(_) => None,
            TargetOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// One outcome per requested target, in declaration order, plus every
/// reported diagnostic.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub targets: IndexMap<String, TargetOutcome>,
    /// Reported diagnostics: target declaration order, then emission order
    pub diagnostics: Vec<Diagnostic>,
    /// Suppressed diagnostics per rule name
    pub suppressed: IndexMap<String, usize>,
    /// Emitted assets in emission order
    pub assets: Vec<EmittedAsset>,
    /// Registry writes this invocation
    pub asset_writes: usize,
}

impl BuildReport {
    /// `false` when any target failed.
    pub fn is_success(&self) -> bool {
        self.targets.values().all(TargetOutcome::is_built)
    }

    pub fn bundle(&self, target: &str) -> Option<&Bundle> {
        self.targets.get(target).and_then(TargetOutcome::bundle)
    }

    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.targets.values().filter_map(TargetOutcome::bundle)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TargetFailure)> {
        self.targets
            .iter()
            .filter_map(|(name, outcome)| outcome.failure().map(|failure| (name.as_str(), failure)))
    }

    pub fn diagnostics_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.target == target)
    }

    pub fn count(&self, severity: DiagnosticSeverity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }

    pub fn suppressed_total(&self) -> usize {
        self.suppressed.values().sum()
    }
}
