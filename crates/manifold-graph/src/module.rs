use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ModuleId;
use super::scan::scan_module;

/// Kind of source a module was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// JavaScript module (`.js`, `.mjs`, `.cjs`)
    JavaScript,
    /// UI component (`.svelte`, `.html`, `.vue`) handed to the component compiler
    Component,
    /// JSON document
    Json,
    /// Stylesheet, bundled by an external collaborator
    Style,
    /// Binary asset (images, fonts) referenced by URL
    Asset,
}

impl SourceType {
    /// Classify a module from its file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "svelte" | "html" | "vue" => Self::Component,
            "json" => Self::Json,
            "css" | "pcss" | "scss" => Self::Style,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" | "ico" | "woff"
            | "woff2" | "ttf" => Self::Asset,
            _ => Self::JavaScript,
        }
    }

    /// Returns `true` when the module is stored as text.
    pub fn is_text(&self) -> bool {
        !matches!(self, Self::Asset)
    }

    /// Returns `true` when import/export statements should be scanned.
    pub fn is_script(&self) -> bool {
        matches!(self, Self::JavaScript | Self::Component)
    }
}

/// Module payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Arc<[u8]>),
}

impl Content {
    /// Text of the module, if it is a text module.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    /// Raw bytes of the module.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }
}

/// Individual import binding from a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportSpecifier {
    /// `import { foo as bar } from 'mod'`
    Named { imported: String, local: String },
    /// `import foo from 'mod'`
    Default(String),
    /// `import * as foo from 'mod'`
    Namespace(String),
}

/// Mechanism used to load the dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportKind {
    /// Static `import` declaration.
    Static,
    /// `export { foo } from 'mod'` style re-export.
    ReExport,
    /// CommonJS `require('mod')` call with a literal specifier.
    Require,
}

/// A dependency edge as written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Specifier as written (`./Nav.svelte`, `svelte/store`, `fs`)
    pub source: String,
    pub specifiers: Vec<ImportSpecifier>,
    pub kind: ImportKind,
    /// Module the specifier resolved to; `None` for unresolved or external imports
    pub resolved_to: Option<ModuleId>,
    /// Full statement text, used when the bundler rewrites the module
    pub statement: String,
}

impl Import {
    /// Convenience constructor for building imports in tests/fixtures.
    pub fn new(
        source: impl Into<String>,
        specifiers: Vec<ImportSpecifier>,
        kind: ImportKind,
        resolved_to: Option<ModuleId>,
    ) -> Self {
        let source = source.into();
        let statement = format!("import '{source}';");
        Self {
            source,
            specifiers,
            kind,
            resolved_to,
            statement,
        }
    }

    /// Named bindings requested from the imported module.
    pub fn named_imports(&self) -> impl Iterator<Item = &str> {
        self.specifiers.iter().filter_map(|spec| match spec {
            ImportSpecifier::Named { imported, .. } => Some(imported.as_str()),
            ImportSpecifier::Default(_) => Some("default"),
            ImportSpecifier::Namespace(_) => None,
        })
    }
}

/// A module of the source graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub source_type: SourceType,
    pub content: Content,
    pub imports: Vec<Import>,
    /// Names exported by the module (`default` included)
    pub exports: Vec<String>,
    /// True if module has star re-exports (`export * from`)
    pub has_star_exports: bool,
}

impl Module {
    /// Create a text module and scan its import/export statements.
    ///
    /// Imports come back unresolved; the loader (or a test) fills in
    /// `resolved_to`.
    pub fn from_source(id: ModuleId, source_type: SourceType, code: impl Into<String>) -> Self {
        let code = code.into();
        let scanned = if source_type.is_script() {
            scan_module(&code)
        } else {
            Default::default()
        };

        Self {
            id,
            source_type,
            content: Content::Text(code),
            imports: scanned.imports,
            exports: scanned.exports,
            has_star_exports: scanned.has_star_exports,
        }
    }

    /// Create a binary asset module.
    pub fn asset(id: ModuleId, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            source_type: SourceType::Asset,
            content: Content::Binary(bytes.into()),
            imports: Vec::new(),
            exports: vec!["default".to_string()],
            has_star_exports: false,
        }
    }

    /// Source text, if this is a text module.
    pub fn code(&self) -> Option<&str> {
        self.content.as_text()
    }

    /// Replace the module text, rescanning statements when the module is a script.
    ///
    /// Resolutions of imports whose specifier survives are carried over.
    pub fn with_code(&self, code: impl Into<String>) -> Self {
        let mut next = Module::from_source(self.id.clone(), self.source_type, code);
        for import in &mut next.imports {
            import.resolved_to = self
                .imports
                .iter()
                .find(|old| old.source == import.source)
                .and_then(|old| old.resolved_to.clone());
        }
        next
    }

    /// Set the resolution of every import with the given specifier.
    pub fn resolve_import(&mut self, source: &str, target: Option<ModuleId>) {
        for import in self.imports.iter_mut().filter(|i| i.source == source) {
            import.resolved_to = target.clone();
        }
    }

    /// Returns `true` if the module exports `name` (star re-exports count as unknown).
    pub fn exports_name(&self, name: &str) -> bool {
        self.exports.iter().any(|export| export == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_extensions() {
        assert_eq!(SourceType::from_extension("svelte"), SourceType::Component);
        assert_eq!(SourceType::from_extension("JSON"), SourceType::Json);
        assert_eq!(SourceType::from_extension("png"), SourceType::Asset);
        assert_eq!(SourceType::from_extension("mjs"), SourceType::JavaScript);
        assert!(!SourceType::Asset.is_text());
        assert!(SourceType::Component.is_script());
    }

    #[test]
    fn from_source_scans_statements() {
        let module = Module::from_source(
            ModuleId::new("src/main.js").unwrap(),
            SourceType::JavaScript,
            "import { start } from './app.js';\nexport const ready = start();\n",
        );

        assert_eq!(module.imports.len(), 1);
        assert_eq!(module.imports[0].source, "./app.js");
        assert_eq!(module.exports, vec!["ready".to_string()]);
    }

    #[test]
    fn with_code_keeps_resolutions() {
        let mut module = Module::from_source(
            ModuleId::new("src/main.js").unwrap(),
            SourceType::JavaScript,
            "import { start } from './app.js';\nstart();\n",
        );
        let app = ModuleId::new("src/app.js").unwrap();
        module.resolve_import("./app.js", Some(app.clone()));

        let rewritten = module.with_code("import { start } from './app.js';\nvar x = start();\n");
        assert_eq!(rewritten.imports[0].resolved_to, Some(app));
    }

    #[test]
    fn named_imports_include_default() {
        let import = Import::new(
            "./x.js",
            vec![
                ImportSpecifier::Default("x".into()),
                ImportSpecifier::Named {
                    imported: "preload".into(),
                    local: "preload".into(),
                },
                ImportSpecifier::Namespace("ns".into()),
            ],
            ImportKind::Static,
            None,
        );
        let names: Vec<_> = import.named_imports().collect();
        assert_eq!(names, vec!["default", "preload"]);
    }
}
