//! `commonjs`: CommonJS modules become ES modules the bundle can link.
//!
//! A script with no `import`/`export` statements that touches `exports`,
//! `module.exports` or calls `require("...")` is wrapped in a function that
//! receives `module` and `exports`. Each literal `require` call turns into
//! an import binding; `module.exports` becomes the default export and every
//! `exports.name = ...` assignment a named export.

use async_trait::async_trait;
use manifold_graph::{ImportKind, Module, ModuleGraph, ModuleId};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::debug;

use super::json::is_export_name;
use super::source::{CommonJsUsage, commonjs_usage};
use super::{Transform, TransformContext, TransformError, TransformOutput, expect_kind};
use crate::artifact::{Artifact, ArtifactKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommonJsTransform;

#[async_trait]
impl Transform for CommonJsTransform {
    fn name(&self) -> &str {
        "commonjs"
    }

    fn input_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    fn output_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    fn validate_config(&self, config: &Value) -> Result<(), TransformError> {
        match config {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(TransformError::invalid_config(self.name(), "expected a table of options")),
        }
    }

    async fn apply(&self, artifact: Artifact, ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        expect_kind(self, &artifact)?;
        let Artifact::Graph(mut graph) = artifact else {
            return Err(TransformError::failed(self.name(), "expected a module graph"));
        };

        let usages: FxHashMap<ModuleId, CommonJsUsage> = graph
            .modules()
            .filter_map(|module| commonjs_module(module).map(|usage| (module.id.clone(), usage)))
            .collect();
        let wrapped: FxHashSet<&ModuleId> = usages.keys().collect();

        let mut converted = Vec::with_capacity(usages.len());
        for (id, usage) in &usages {
            let Some(module) = graph.module(id) else { continue };
            let Some(code) = module.code() else { continue };
            let wrapped_code = wrap(module, code, usage, |dep| {
                wrapped.contains(dep) || !graph.module(dep).is_some_and(|m| m.source_type.is_script())
            });
            converted.push(module.with_code(wrapped_code));
        }

        let count = converted.len();
        for module in converted {
            debug!(module = %module.id, exports = module.exports.len(), "wrapped CommonJS module");
            graph.add_module(module);
        }
        if count > 0 {
            debug!(target_name = %ctx.target.name, modules = count, "converted CommonJS modules");
        }

        Ok(TransformOutput::new(Artifact::Graph(graph)))
    }
}

/// CommonJS usage of a script that has no module syntax of its own.
fn commonjs_module(module: &Module) -> Option<CommonJsUsage> {
    if !module.source_type.is_script() || !module.exports.is_empty() || module.has_star_exports {
        return None;
    }
    if module.imports.iter().any(|import| import.kind != ImportKind::Require) {
        return None;
    }
    let usage = commonjs_usage(module.code()?);
    usage.is_commonjs().then_some(usage)
}

/// Wrapped source for `module`. `default_import(dep)` picks a default
/// import over a namespace import for a bundled dependency.
fn wrap(module: &Module, code: &str, usage: &CommonJsUsage, default_import: impl Fn(&ModuleId) -> bool) -> String {
    let mut bindings: Vec<(&str, String)> = Vec::new();
    for call in &usage.requires {
        if !bindings.iter().any(|(specifier, _)| *specifier == call.specifier) {
            bindings.push((call.specifier.as_str(), format!("__require{}", bindings.len())));
        }
    }

    let mut out = String::new();
    for (specifier, binding) in &bindings {
        let dep = module
            .imports
            .iter()
            .find(|import| import.source == *specifier)
            .and_then(|import| import.resolved_to.as_ref());
        let source = Value::String(specifier.to_string());
        match dep {
            Some(dep) if !default_import(dep) => out.push_str(&format!("import * as {binding} from {source};\n")),
            _ => out.push_str(&format!("import {binding} from {source};\n")),
        }
    }

    let mut body = String::with_capacity(code.len());
    let mut last = 0;
    for call in &usage.requires {
        body.push_str(&code[last..call.start]);
        if let Some((_, binding)) = bindings.iter().find(|(specifier, _)| *specifier == call.specifier) {
            body.push_str(binding);
        }
        last = call.end;
    }
    body.push_str(&code[last..]);

    out.push_str("var __module = { exports: {} };\n");
    out.push_str("(function (module, exports) {\n");
    out.push_str(body.trim_end());
    out.push_str("\n}).call(__module.exports, __module, __module.exports);\n");
    out.push_str("export default __module.exports;\n");
    for name in usage.named_exports.iter().filter(|name| is_export_name(name)) {
        out.push_str(&format!("export var {name} = __module.exports.{name};\n"));
    }
    out
}
