//! `json`: JSON documents become ES modules.

use async_trait::async_trait;
use manifold_graph::{Module, SourceType, is_identifier};
use serde_json::Value;
use tracing::debug;

use super::{Transform, TransformContext, TransformError, TransformOutput, expect_kind};
use crate::artifact::{Artifact, ArtifactKind};
use crate::diagnostics::Diagnostic;

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "import", "in", "instanceof", "let", "new", "null", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Turns every JSON module into `export default` plus one named export per
/// identifier-safe top-level key.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransform;

#[async_trait]
impl Transform for JsonTransform {
    fn name(&self) -> &str {
        "json"
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

    async fn apply(&self, artifact: Artifact, _ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        expect_kind(self, &artifact)?;
        let Artifact::Graph(mut graph) = artifact else {
            return Err(TransformError::failed(self.name(), "expected a module graph"));
        };

        let mut diagnostics = Vec::new();
        let json_modules: Vec<_> = graph
            .modules()
            .filter(|module| module.source_type == SourceType::Json)
            .cloned()
            .collect();

        for module in json_modules {
            let Some(text) = module.code() else { continue };
            match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    let code = to_module(&value);
                    graph.add_module(Module::from_source(module.id.clone(), SourceType::JavaScript, code));
                    debug!(module = %module.id, "converted JSON module");
                }
                Err(err) => diagnostics.push(Diagnostic::transform_failed(
                    &module.id,
                    format!("Could not parse JSON module {}: {err}", module.id),
                )),
            }
        }

        Ok(TransformOutput::with_diagnostics(Artifact::Graph(graph), diagnostics))
    }
}

pub(super) fn is_export_name(key: &str) -> bool {
    is_identifier(key) && !RESERVED.contains(&key)
}

fn to_module(value: &Value) -> String {
    let Value::Object(map) = value else {
        return format!("export default {value};\n");
    };

    let mut code = String::new();
    let mut fields = Vec::with_capacity(map.len());
    for (key, field) in map {
        if is_export_name(key) {
            code.push_str(&format!("export const {key} = {field};\n"));
            fields.push(format!("\t{key}"));
        } else {
            fields.push(format!("\t{}: {field}", Value::String(key.clone())));
        }
    }

    if fields.is_empty() {
        code.push_str("export default {};\n");
    } else {
        code.push_str(&format!("export default {{\n{}\n}};\n", fields.join(",\n")));
    }
    code
}
