//! `lower`: legacy syntax lowering.
//!
//! Stand-in for a real down-leveling compiler: block-scoped declarations
//! become `var`. Normally gated on the `legacy` flag.

use async_trait::async_trait;
use serde_json::Value;

use super::source::lower_declarations;
use super::{Transform, TransformContext, TransformError, TransformOutput, expect_kind};
use crate::artifact::{Artifact, ArtifactKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct LowerTransform;

pub(crate) fn lower(code: &str) -> String {
    lower_declarations(code)
}

#[async_trait]
impl Transform for LowerTransform {
    fn name(&self) -> &str {
        "lower"
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

        let rewritten: Vec<_> = graph
            .modules()
            .filter(|module| module.source_type.is_script())
            .filter_map(|module| {
                let code = module.code()?;
                let lowered = lower(code);
                (lowered != code).then(|| module.with_code(lowered))
            })
            .collect();
        for module in rewritten {
            graph.add_module(module);
        }

        Ok(TransformOutput::new(Artifact::Graph(graph)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;
    use crate::transform::test_support::Fixture;
    use manifold_graph::{Module, ModuleGraph, ModuleId, SourceType};

    #[test]
    fn lowers_block_declarations() {
        assert_eq!(
            lower("export const a = 1;\nfor (let i = 0; i < 2; i++) {}\nconst { b } = c;"),
            "export var a = 1;\nfor (var i = 0; i < 2; i++) {}\nvar { b } = c;"
        );
    }

    #[test]
    fn leaves_identifiers_alone() {
        let code = "const letter = x.const; let constant = letters;";
        assert_eq!(lower(code), "var letter = x.const; var constant = letters;");
        assert_eq!(lower("element.let = 1;"), "element.let = 1;");
    }

    #[test]
    fn leaves_strings_and_comments_alone() {
        let code = "const s = \"let me know\"; // const in a comment\nlet t = `const x = ${s}`; /* let y */\n";
        assert_eq!(
            lower(code),
            "var s = \"let me know\"; // const in a comment\nvar t = `const x = ${s}`; /* let y */\n"
        );
    }

    #[tokio::test]
    async fn keeps_exports() {
        let id = ModuleId::new("src/app.js").unwrap();
        let graph = ModuleGraph::from_modules([Module::from_source(
            id.clone(),
            SourceType::JavaScript,
            "export const start = () => {};\n",
        )]);
        let fixture = Fixture::new(Target::new("client"));
        let output = LowerTransform.apply(Artifact::Graph(graph), &fixture.ctx()).await.unwrap();
        let graph = output.artifact.into_graph().unwrap();
        let module = graph.module(&id).unwrap();
        assert_eq!(module.code(), Some("export var start = () => {};\n"));
        assert!(module.exports_name("start"));
    }
}
