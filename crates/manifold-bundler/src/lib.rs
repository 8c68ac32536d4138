#![cfg_attr(docsrs, feature(doc_cfg))]

//! # manifold-bundler
//!
//! Builds one bundle per target from a shared source graph.
//!
//! Every target runs its own transform chain over its own copy of the
//! graph, concurrently with the others. The targets of one invocation share
//! a diagnostic router, an append-only diagnostic stream and an asset
//! registry that guarantees each shared asset is emitted exactly once.
//!
//! ## Quick Start
//!
//! ```no_run
//! use manifold_bundler::{
//!     BuildFlags, DiagnosticRouter, Orchestrator, RuntimeEnvironment, SuppressionRule, Target,
//!     TransformRegistry,
//! };
//! use manifold_graph::{GraphLoader, NativeRuntime};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TransformRegistry::with_builtins();
//! let bundle = registry.instantiate("bundle", serde_json::Value::Null, Default::default())?;
//!
//! let targets = vec![
//!     Target::new("client").entry("src/client.js").transform(bundle.clone()),
//!     Target::new("server")
//!         .environment(RuntimeEnvironment::Node)
//!         .entry("src/server.js")
//!         .node_builtins()
//!         .transform(bundle),
//! ];
//!
//! let loader = GraphLoader::new(Arc::new(NativeRuntime), ".")
//!     .with_alias_fields(Orchestrator::resolution_fields(&targets));
//! let graph = loader.load(Orchestrator::entry_points(&targets)).await?;
//!
//! let router = DiagnosticRouter::new().with_rule(SuppressionRule::missing_export("preload"));
//! let report = Orchestrator::new(router)
//!     .build(targets, BuildFlags::from_env(), graph)
//!     .await?;
//!
//! for (name, outcome) in &report.targets {
//!     println!("{name}: {}", if outcome.is_built() { "ok" } else { "failed" });
//! }
//! # Ok(()) }
//! ```

pub mod artifact;
pub mod assets;
mod chain;
pub mod diagnostics;
pub mod mode;
pub mod orchestrator;
pub mod policy;
pub mod report;
pub mod router;
pub mod stream;
pub mod substitution;
pub mod target;
pub mod transform;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging};

pub use artifact::{Artifact, ArtifactKind, Bundle};
pub use assets::{AssetError, AssetRegistry, AssetSource, EmissionPlan, EmittedAsset};
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticContext, DiagnosticSeverity};
pub use mode::{BuildFlags, BuildMode, Gate, GateError};
pub use orchestrator::{BuildPlan, Orchestrator};
pub use policy::PolicyViolation;
pub use report::{BuildReport, TargetOutcome};
pub use router::{DiagnosticRouter, FieldMatcher, RouteDecision, SuppressionRule};
pub use stream::DiagnosticStream;
pub use substitution::{SubstitutionError, SubstitutionTable, SubstitutionValue};
pub use target::{
    EntrySignatures, ExternalSpec, OutputFormat, OutputSpec, ResolutionPolicy, RuntimeEnvironment, Target,
};
pub use transform::{
    Transform, TransformContext, TransformError, TransformOutput, TransformRef, TransformRegistry,
};

/// A target declaration is inconsistent. Detected before any build work
/// starts; aborts the whole invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("target #{index} has an empty name")]
    EmptyTargetName { index: usize },

    #[error("target '{name}' is declared more than once")]
    DuplicateTarget { name: String },

    #[error("target '{target}' has no entry points")]
    NoEntries { target: String },

    #[error("target '{target}': {source}")]
    InvalidToken {
        target: String,
        #[source]
        source: SubstitutionError,
    },

    #[error("target '{target}': {source}")]
    InvalidTransformConfig {
        target: String,
        #[source]
        source: TransformError,
    },

    #[error("target '{target}': transform '{transform}' expects a {expected} but receives a {found}")]
    KindMismatch {
        target: String,
        transform: String,
        expected: ArtifactKind,
        found: ArtifactKind,
    },

    #[error("target '{target}': the enabled transform chain does not produce a bundle")]
    ChainDoesNotEndInBundle { target: String },
}

impl miette::Diagnostic for ConfigurationError {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            ConfigurationError::EmptyTargetName { .. } => "EMPTY_TARGET_NAME",
            ConfigurationError::DuplicateTarget { .. } => "DUPLICATE_TARGET",
            ConfigurationError::NoEntries { .. } => "NO_ENTRIES",
            ConfigurationError::InvalidToken { .. } => "INVALID_TOKEN",
            ConfigurationError::InvalidTransformConfig { .. } => "INVALID_TRANSFORM_CONFIG",
            ConfigurationError::KindMismatch { .. } => "KIND_MISMATCH",
            ConfigurationError::ChainDoesNotEndInBundle { .. } => "CHAIN_WITHOUT_BUNDLE",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            ConfigurationError::EmptyTargetName { .. } | ConfigurationError::DuplicateTarget { .. } => {
                Some(Box::new("Every target needs a unique, non-empty name."))
            }
            ConfigurationError::NoEntries { target } => Some(Box::new(format!(
                "Add at least one module to the `entries` list of target '{target}'."
            ))),
            ConfigurationError::InvalidToken { .. } => Some(Box::new(
                "Substitution tokens must be static dotted identifiers such as `process.env.NODE_ENV`.",
            )),
            ConfigurationError::InvalidTransformConfig { .. } => {
                Some(Box::new("Check the `options` table of this transform."))
            }
            ConfigurationError::KindMismatch { transform, .. } => Some(Box::new(format!(
                "Move '{transform}' so that it runs on what the previous enabled transform produces, or change its `enabled` gate."
            ))),
            ConfigurationError::ChainDoesNotEndInBundle { .. } => Some(Box::new(
                "Add the `bundle` transform (or another graph to bundle transform) and make sure it is enabled for this build mode.",
            )),
        }
    }
}

/// Why a single target produced no bundle. Never affects other targets.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetFailure {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    /// Diagnostics reported with error severity after routing.
    #[error("{errors} error diagnostic(s) reported; first: {first}")]
    Diagnostics { errors: usize, first: String },

    #[error("target task panicked: {0}")]
    Panicked(String),
}

impl TargetFailure {
    /// Stable code for rendering.
    pub fn code(&self) -> &'static str {
        match self {
            TargetFailure::Policy(PolicyViolation::DedupeConflict { .. }) => "DEDUPE_CONFLICT",
            TargetFailure::Policy(PolicyViolation::DisallowedExternal { .. }) => "DISALLOWED_EXTERNAL",
            TargetFailure::Transform(_) => "TRANSFORM_ERROR",
            TargetFailure::Substitution(_) => "INVALID_TOKEN",
            TargetFailure::Diagnostics { .. } => "ERROR_DIAGNOSTICS",
            TargetFailure::Panicked(_) => "PANIC",
        }
    }
}
