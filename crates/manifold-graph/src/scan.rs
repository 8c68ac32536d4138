//! Static import/export scanner.
//!
//! The graph only needs the module-level statements that create edges and
//! exported names, so this is a line-oriented regex scan rather than a full
//! parse. Dynamic `import()` calls are not graph edges and are ignored;
//! CommonJS `require('...')` calls with a literal specifier are.

use std::sync::LazyLock;

use regex::Regex;

use super::module::{Import, ImportKind, ImportSpecifier};

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\b\s*(?:([^'";()]*?)\s*\bfrom\s*)?['"]([^'"\n]+)['"][ \t]*;?"#)
        .expect("import regex is valid")
});

static REEXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s*(\*(?:\s*as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"][ \t]*;?"#,
    )
    .expect("re-export regex is valid")
});

static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[^\w$.])(require\s*\(\s*['"]([^'"\n]+)['"]\s*\))"#).expect("require regex is valid")
});

static DECL_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*export\s+(?:async\s+)?(?:const|let|var|function\s*\*?|class)\s*([A-Za-z_$][\w$]*)",
    )
    .expect("declaration regex is valid")
});

static DEFAULT_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+default\b").expect("default regex is valid")
});

static LIST_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}(\s*from\b)?")
        .expect("export list regex is valid")
});

/// Statements found in one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Imports and re-exports in source order
    pub imports: Vec<Import>,
    /// Exported names, deduplicated, in source order
    pub exports: Vec<String>,
    pub has_star_exports: bool,
}

impl ScanResult {
    fn add_export(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.exports.contains(&name) {
            self.exports.push(name);
        }
    }
}

/// Scan a module's source for static imports, re-exports and exports.
pub fn scan_module(code: &str) -> ScanResult {
    let mut result = ScanResult::default();
    let mut edges: Vec<(usize, Import)> = Vec::new();
    let mut names: Vec<(usize, String)> = Vec::new();

    for caps in IMPORT_RE.captures_iter(code) {
        let (Some(whole), Some(source)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let specifiers = caps
            .get(1)
            .map(|clause| parse_import_clause(clause.as_str()))
            .unwrap_or_default();

        edges.push((
            whole.start(),
            Import {
                source: source.as_str().to_string(),
                specifiers,
                kind: ImportKind::Static,
                resolved_to: None,
                statement: whole.as_str().trim().to_string(),
            },
        ));
    }

    for caps in REEXPORT_RE.captures_iter(code) {
        let (Some(whole), Some(clause), Some(source)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let clause = clause.as_str();

        let specifiers = if let Some(rest) = clause.strip_prefix('*') {
            match rest.trim().strip_prefix("as") {
                Some(ns) => {
                    let ns = ns.trim().to_string();
                    names.push((whole.start(), ns.clone()));
                    vec![ImportSpecifier::Namespace(ns)]
                }
                None => {
                    result.has_star_exports = true;
                    Vec::new()
                }
            }
        } else {
            let pairs = parse_binding_list(clause.trim_matches(|c| c == '{' || c == '}'));
            pairs
                .into_iter()
                .map(|(imported, exported)| {
                    names.push((whole.start(), exported.clone()));
                    ImportSpecifier::Named {
                        imported,
                        local: exported,
                    }
                })
                .collect()
        };

        edges.push((
            whole.start(),
            Import {
                source: source.as_str().to_string(),
                specifiers,
                kind: ImportKind::ReExport,
                resolved_to: None,
                statement: whole.as_str().trim().to_string(),
            },
        ));
    }

    for caps in REQUIRE_RE.captures_iter(code) {
        let (Some(call), Some(source)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        edges.push((
            call.start(),
            Import {
                source: source.as_str().to_string(),
                specifiers: Vec::new(),
                kind: ImportKind::Require,
                resolved_to: None,
                statement: call.as_str().to_string(),
            },
        ));
    }

    edges.sort_by_key(|(start, _)| *start);
    result.imports = edges.into_iter().map(|(_, import)| import).collect();

    for caps in DECL_EXPORT_RE.captures_iter(code) {
        if let Some(name) = caps.get(1) {
            names.push((name.start(), name.as_str().to_string()));
        }
    }
    for found in DEFAULT_EXPORT_RE.find_iter(code) {
        names.push((found.start(), "default".to_string()));
    }
    for caps in LIST_EXPORT_RE.captures_iter(code) {
        if caps.get(2).is_some() {
            continue;
        }
        let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        for (_, exported) in parse_binding_list(list.as_str()) {
            names.push((whole.start(), exported));
        }
    }
    names.sort_by_key(|(start, _)| *start);
    for (_, name) in names {
        result.add_export(name);
    }

    result
}

/// Parse the clause between `import` and `from`.
fn parse_import_clause(clause: &str) -> Vec<ImportSpecifier> {
    let clause = clause.trim();
    let mut specifiers = Vec::new();

    let (head, braces) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => {
            (&clause[..open], Some(&clause[open + 1..close]))
        }
        _ => (clause, None),
    };

    for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(ns) = part.strip_prefix('*') {
            let local = ns.trim().trim_start_matches("as").trim();
            if !local.is_empty() {
                specifiers.push(ImportSpecifier::Namespace(local.to_string()));
            }
        } else if is_identifier(part) {
            specifiers.push(ImportSpecifier::Default(part.to_string()));
        }
    }

    if let Some(list) = braces {
        for (imported, local) in parse_binding_list(list) {
            if imported == "default" {
                specifiers.push(ImportSpecifier::Default(local));
            } else {
                specifiers.push(ImportSpecifier::Named { imported, local });
            }
        }
    }

    specifiers
}

/// Parse `a, b as c` into `(a, a)`, `(b, c)` pairs.
fn parse_binding_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut words = part.split_whitespace();
            let name = words.next()?;
            let alias = match (words.next(), words.next()) {
                (Some("as"), Some(alias)) => alias,
                _ => name,
            };
            Some((name.to_string(), alias.to_string()))
        })
        .collect()
}

/// Returns `true` for a plain JavaScript identifier.
pub fn is_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_import_forms() {
        let code = r#"
import App from './App.svelte';
import * as store from 'svelte/store';
import { goto, preload as load } from '@framework/internal';
import Layout, { stores } from "./layout.js"
import './global.css';
const lazy = import('./lazy.js');
"#;
        let result = scan_module(code);
        let sources: Vec<_> = result.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                "./App.svelte",
                "svelte/store",
                "@framework/internal",
                "./layout.js",
                "./global.css"
            ]
        );

        assert_eq!(
            result.imports[0].specifiers,
            vec![ImportSpecifier::Default("App".into())]
        );
        assert_eq!(
            result.imports[1].specifiers,
            vec![ImportSpecifier::Namespace("store".into())]
        );
        assert_eq!(
            result.imports[2].specifiers,
            vec![
                ImportSpecifier::Named {
                    imported: "goto".into(),
                    local: "goto".into()
                },
                ImportSpecifier::Named {
                    imported: "preload".into(),
                    local: "load".into()
                },
            ]
        );
        assert_eq!(result.imports[3].specifiers.len(), 2);
        assert!(result.imports[4].specifiers.is_empty());
        assert_eq!(result.imports[4].statement, "import './global.css';");
    }

    #[test]
    fn scans_multiline_import() {
        let code = "import {\n  a,\n  b\n} from './ab.js';\n";
        let result = scan_module(code);
        assert_eq!(result.imports.len(), 1);
        assert_eq!(result.imports[0].specifiers.len(), 2);
    }

    #[test]
    fn scans_exports() {
        let code = r#"
export const ready = true;
export async function start() {}
export class Router {}
export default App;
const a = 1, b = 2;
export { a, b as beta };
export { helper } from './helpers.js';
export * from './all.js';
"#;
        let result = scan_module(code);
        assert_eq!(
            result.exports,
            vec!["ready", "start", "Router", "default", "a", "beta", "helper"]
        );
        assert!(result.has_star_exports);

        let reexports: Vec<_> = result
            .imports
            .iter()
            .filter(|i| i.kind == ImportKind::ReExport)
            .map(|i| i.source.as_str())
            .collect();
        assert_eq!(reexports, vec!["./helpers.js", "./all.js"]);
    }

    #[test]
    fn scans_require_calls() {
        let code = "const a = require('./a.js');\nconst { b } = require(\"pkg\");\nlib.require('./not-an-edge.js');\n";
        let result = scan_module(code);
        let requires: Vec<_> = result
            .imports
            .iter()
            .map(|i| (i.kind, i.source.as_str(), i.statement.as_str()))
            .collect();
        assert_eq!(
            requires,
            vec![
                (ImportKind::Require, "./a.js", "require('./a.js')"),
                (ImportKind::Require, "pkg", "require(\"pkg\")"),
            ]
        );
        assert!(result.exports.is_empty());
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("$store"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier(""));
    }
}
