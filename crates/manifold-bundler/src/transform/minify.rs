//! `minify`: comment and whitespace stripping.
//!
//! Stand-in for a real minifier. Normally gated on production builds.

use async_trait::async_trait;
use serde_json::Value;

use super::source::strip_comments_and_blank_lines;
use super::{Transform, TransformContext, TransformError, TransformOutput, expect_kind};
use crate::artifact::{Artifact, ArtifactKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyTransform;

#[async_trait]
impl Transform for MinifyTransform {
    fn name(&self) -> &str {
        "minify"
    }

    fn input_kind(&self) -> ArtifactKind {
        ArtifactKind::Bundle
    }

    fn output_kind(&self) -> ArtifactKind {
        ArtifactKind::Bundle
    }

    fn validate_config(&self, config: &Value) -> Result<(), TransformError> {
        match config {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(TransformError::invalid_config(self.name(), "expected a table of options")),
        }
    }

    async fn apply(&self, artifact: Artifact, _ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        expect_kind(self, &artifact)?;
        let Artifact::Bundle(mut bundle) = artifact else {
            return Err(TransformError::failed(self.name(), "expected a bundle"));
        };
        bundle.code = minify(&bundle.code);
        Ok(TransformOutput::new(Artifact::Bundle(bundle)))
    }
}

/// Remove comments outside string literals, trim every line and drop blank
/// ones. Lines inside template literals are kept as written.
pub(crate) fn minify(code: &str) -> String {
    strip_comments_and_blank_lines(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_blank_lines() {
        let code = "// src/app.js\nconst a = 1; // trailing\n\n/* block\n comment */\n    start(a);\n";
        assert_eq!(minify(code), "const a = 1;\nstart(a);\n");
    }

    #[test]
    fn keeps_comment_markers_inside_strings() {
        let code = "const url = \"https://example.com/a\";\nconst s = '/* not a comment */';\nconst t = `a // b`;\n";
        assert_eq!(minify(code), code);
    }

    #[test]
    fn handles_escaped_quotes() {
        let code = "const s = \"say \\\"hi\\\" // here\"; // gone\n";
        assert_eq!(minify(code), "const s = \"say \\\"hi\\\" // here\";\n");
    }

    #[test]
    fn preserves_template_literal_lines() {
        let code = "const page = `\n  <main>\n    <h1>${title}</h1>\n\n  </main>\n`;\n    render(page);\n";
        assert_eq!(
            minify(code),
            "const page = `\n  <main>\n    <h1>${title}</h1>\n\n  </main>\n`;\nrender(page);\n"
        );
    }

    #[test]
    fn inline_block_comment_keeps_tokens_apart() {
        assert_eq!(minify("return/* gap */value;\n"), "return value;\n");
    }
}
