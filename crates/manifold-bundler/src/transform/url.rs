//! `url`: asset modules become their public URL.
//!
//! File names are content hashed, so every target computes the same name
//! for the same bytes. Only the designated owner of a source directory
//! writes to the asset registry. Its assets are registered from the shared
//! graph before any target runs, so they exist even when the owner's own
//! chain later fails. Other targets reference the owner's registration
//! through a placeholder resolved at the end of their chain.

use std::path::Path;

use async_trait::async_trait;
use manifold_graph::{Module, ModuleGraph, ModuleId, SourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Transform, TransformContext, TransformError, TransformOutput, expect_kind};
use crate::artifact::{Artifact, ArtifactKind};
use crate::assets::{AssetSource, EmissionPlan, EmittedAsset, content_type_from_path};

/// Options of the `url` transform.
///
/// ```toml
/// [[targets.transforms]]
/// name = "url"
/// options = { source_dir = "src/node_modules/images", public_path = "/client/", emit = false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrlOptions {
    /// Project-relative directory whose files are handled
    pub source_dir: String,

    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Whether this target may emit the files
    #[serde(default = "default_emit")]
    pub emit: bool,

    /// Extensions handled; empty means every binary asset
    #[serde(default)]
    pub include: Vec<String>,
}

fn default_public_path() -> String {
    "/".to_string()
}

fn default_emit() -> bool {
    true
}

impl UrlOptions {
    pub fn from_config(config: &Value) -> Result<Self, TransformError> {
        let mut options: UrlOptions = serde_json::from_value(config.clone())
            .map_err(|err| TransformError::invalid_config("url", err.to_string()))?;

        let dir = options.source_dir.trim_start_matches("./").trim_end_matches('/');
        let normalized = ModuleId::new(dir)
            .map_err(|err| TransformError::invalid_config("url", format!("source_dir: {err}")))?;
        options.source_dir = normalized.to_string();

        if !options.public_path.ends_with('/') {
            options.public_path.push('/');
        }
        Ok(options)
    }

    fn handles(&self, module: &Module) -> bool {
        let in_dir = module
            .id
            .as_str()
            .strip_prefix(self.source_dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        if !in_dir {
            return false;
        }
        if self.include.is_empty() {
            return module.source_type == SourceType::Asset;
        }
        module.id.extension().is_some_and(|ext| {
            self.include
                .iter()
                .any(|inc| inc.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
    }
}

/// The registry entry for `module` emitted by `owner`.
fn emitted_asset(options: &UrlOptions, module: &Module, owner: &str) -> EmittedAsset {
    let bytes = module.content.as_bytes();
    let file_name = hashed_file_name(&module.id, bytes);
    EmittedAsset {
        asset_id: module.id.to_string(),
        public_url: format!("{}{file_name}", options.public_path),
        file_name,
        content_type: content_type_from_path(Path::new(module.id.as_str())).to_string(),
        bytes: bytes.into(),
        owner: owner.to_string(),
    }
}

/// Content-hashed file name: `<hash><.ext>`.
pub(crate) fn hashed_file_name(id: &ModuleId, bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes).to_hex();
    let hash = &hash.as_str()[..16];
    match id.extension() {
        Some(ext) => format!("{hash}.{ext}"),
        None => hash.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlTransform;

#[async_trait]
impl Transform for UrlTransform {
    fn name(&self) -> &str {
        "url"
    }

    fn input_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    fn output_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    fn validate_config(&self, config: &Value) -> Result<(), TransformError> {
        UrlOptions::from_config(config).map(|_| ())
    }

    fn asset_sources(&self, config: &Value) -> Vec<AssetSource> {
        match UrlOptions::from_config(config) {
            Ok(options) => vec![AssetSource {
                source_dir: options.source_dir,
                emit: options.emit,
            }],
            Err(_) => Vec::new(),
        }
    }

    fn owned_assets(&self, graph: &ModuleGraph, target: &str, config: &Value, plan: &EmissionPlan) -> Vec<EmittedAsset> {
        let Ok(options) = UrlOptions::from_config(config) else {
            return Vec::new();
        };
        if !options.emit || plan.owner_of(&options.source_dir) != Some(target) {
            return Vec::new();
        }
        graph
            .modules()
            .filter(|module| options.handles(module))
            .map(|module| emitted_asset(&options, module, target))
            .collect()
    }

    async fn apply(&self, artifact: Artifact, ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        expect_kind(self, &artifact)?;
        let options = UrlOptions::from_config(ctx.config)?;
        let Artifact::Graph(mut graph) = artifact else {
            return Err(TransformError::failed(self.name(), "expected a module graph"));
        };

        let assets: Vec<_> = graph
            .modules()
            .filter(|module| options.handles(module))
            .cloned()
            .collect();

        let owner = ctx.assets.owner_of(&options.source_dir).map(str::to_string);
        for module in assets {
            let url = match owner.as_deref() {
                Some(owner) if owner == ctx.target.name && options.emit => {
                    ctx.assets.emit(emitted_asset(&options, &module, owner)).public_url
                }
                Some(owner) => ctx.assets.defer(module.id.as_str(), owner),
                None => emitted_asset(&options, &module, &ctx.target.name).public_url,
            };

            debug!(asset = %module.id, url = %url, "asset module rewritten");
            let code = format!("export default {};\n", Value::String(url));
            graph.add_module(Module::from_source(module.id.clone(), SourceType::JavaScript, code));
        }

        Ok(TransformOutput::new(Artifact::Graph(graph)))
    }
}
