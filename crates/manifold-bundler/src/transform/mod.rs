//! The transform contract and built-in transforms.
//!
//! A transform maps one artifact to another and reports diagnostics on the
//! side. Transforms are stateless: everything a run needs (target, flags,
//! configuration, substitutions, asset access) arrives through the
//! `TransformContext`.

mod bundle;
mod commonjs;
mod json;
mod lower;
mod minify;
mod registry;
mod source;
mod url;

pub use bundle::BundleTransform;
pub use commonjs::CommonJsTransform;
pub use json::JsonTransform;
pub use lower::LowerTransform;
pub use minify::MinifyTransform;
pub use registry::TransformRegistry;
pub use url::{UrlOptions, UrlTransform};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use manifold_graph::ModuleGraph;

use crate::artifact::{Artifact, ArtifactKind};
use crate::assets::{AssetAccess, AssetSource, EmissionPlan, EmittedAsset};
use crate::diagnostics::Diagnostic;
use crate::mode::{BuildFlags, Gate};
use crate::substitution::SubstitutionTable;
use crate::target::Target;

/// Everything a transform may read during one run.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub target: &'a Target,
    pub flags: &'a BuildFlags,
    /// The transform's own configuration value
    pub config: &'a Value,
    pub substitutions: &'a SubstitutionTable,
    pub assets: &'a AssetAccess,
}

/// Result of a successful transform run.
#[derive(Debug)]
pub struct TransformOutput {
    pub artifact: Artifact,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformOutput {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(artifact: Artifact, diagnostics: Vec<Diagnostic>) -> Self {
        Self { artifact, diagnostics }
    }
}

/// A transform could not produce any output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("transform '{transform}' expects a {expected}, got a {found}")]
    UnexpectedInput {
        transform: String,
        expected: ArtifactKind,
        found: ArtifactKind,
    },

    #[error("invalid options for transform '{transform}': {message}")]
    InvalidConfig { transform: String, message: String },

    #[error("transform '{transform}' failed: {message}")]
    Failed { transform: String, message: String },
}

impl TransformError {
    pub fn failed(transform: &str, message: impl Into<String>) -> Self {
        Self::Failed {
            transform: transform.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_config(transform: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            transform: transform.to_string(),
            message: message.into(),
        }
    }
}

/// A pluggable unit mapping an artifact to another.
///
/// The component compiler and any other external collaborator plug in here.
#[async_trait]
pub trait Transform: Send + Sync + fmt::Debug {
    /// Registry name
    fn name(&self) -> &str;

    fn input_kind(&self) -> ArtifactKind;

    fn output_kind(&self) -> ArtifactKind;

    /// Reject bad options before any build work starts.
    fn validate_config(&self, _config: &Value) -> Result<(), TransformError> {
        Ok(())
    }

    /// Asset directories this transform reads, for emission planning.
    fn asset_sources(&self, _config: &Value) -> Vec<AssetSource> {
        Vec::new()
    }

    /// Assets `target` owns under this transform, registered from the shared
    /// graph before any target runs.
    fn owned_assets(
        &self,
        _graph: &ModuleGraph,
        _target: &str,
        _config: &Value,
        _plan: &EmissionPlan,
    ) -> Vec<EmittedAsset> {
        Vec::new()
    }

    async fn apply(
        &self,
        artifact: Artifact,
        ctx: &TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError>;
}

/// A transform placed in a target's chain.
#[derive(Debug, Clone)]
pub struct TransformRef {
    pub transform: Arc<dyn Transform>,
    pub config: Value,
    pub enabled: Gate,
}

impl TransformRef {
    pub fn new(transform: impl Transform + 'static) -> Self {
        Self::from_arc(Arc::new(transform))
    }

    pub fn from_arc(transform: Arc<dyn Transform>) -> Self {
        Self {
            transform,
            config: Value::Null,
            enabled: Gate::always(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn enabled_when(mut self, gate: Gate) -> Self {
        self.enabled = gate;
        self
    }

    pub fn name(&self) -> &str {
        self.transform.name()
    }

    pub fn is_enabled(&self, flags: &BuildFlags) -> bool {
        self.enabled.evaluate(flags)
    }

    /// Asset sources of this reference when it is enabled for `flags`.
    pub fn asset_sources(&self, flags: &BuildFlags) -> Vec<AssetSource> {
        if self.is_enabled(flags) {
            self.transform.asset_sources(&self.config)
        } else {
            Vec::new()
        }
    }
}

/// Check that `artifact` is what `transform` accepts.
pub(crate) fn expect_kind(transform: &dyn Transform, artifact: &Artifact) -> Result<(), TransformError> {
    if artifact.kind() == transform.input_kind() {
        Ok(())
    } else {
        Err(TransformError::UnexpectedInput {
            transform: transform.name().to_string(),
            expected: transform.input_kind(),
            found: artifact.kind(),
        })
    }
}
