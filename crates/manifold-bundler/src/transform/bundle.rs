//! `bundle`: scope-hoisting concatenation of the module graph.
//!
//! Modules are emitted dependencies-first from the entries. Internal
//! imports are linked through top-level bindings, external imports are
//! hoisted to the top of the bundle, and entry exports survive only when
//! the target preserves entry signatures. Top-level bindings that collide
//! across modules are renamed (`x`, `x$1`, ...) before concatenation.

use std::sync::LazyLock;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use manifold_graph::{Import, ImportKind, ImportSpecifier, Module, ModuleGraph, ModuleId, is_identifier};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::debug;

use super::source::{claim, rename_identifiers, top_level_declarations};
use super::{Transform, TransformContext, TransformError, TransformOutput, expect_kind};
use crate::artifact::{Artifact, ArtifactKind, Bundle};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::target::{EntrySignatures, OutputFormat};

static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+").expect("default export regex is valid")
});

static DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:async\s+)?(?:const|let|var|function|class)\b)")
        .expect("declaration export regex is valid")
});

static DECL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+(?:async\s+)?(?:const|let|var|function\s*\*?|class)\s*([A-Za-z_$][\w$]*)")
        .expect("declaration name regex is valid")
});

static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}(\s*from\b)?[ \t]*;?").expect("export list regex is valid")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct BundleTransform;

#[async_trait]
impl Transform for BundleTransform {
    fn name(&self) -> &str {
        "bundle"
    }

    fn input_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
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

    async fn apply(&self, artifact: Artifact, ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        expect_kind(self, &artifact)?;
        let Artifact::Graph(graph) = artifact else {
            return Err(TransformError::failed(self.name(), "expected a module graph"));
        };
        if graph.entries().is_empty() {
            return Err(TransformError::failed(self.name(), "the graph has no entry modules"));
        }

        let mut diagnostics = Vec::new();
        for chain in graph.cycles() {
            diagnostics.push(Diagnostic::circular_dependency(&chain));
        }
        diagnostics.extend(check_exports(&graph));
        diagnostics.extend(check_requires(&graph));

        let strict = ctx.target.output.preserve_entry_signatures == EntrySignatures::Strict;
        let mut linker = Linker::new(&graph, ctx.target.output.format);
        let bundle = linker.link(&ctx.target.name, &ctx.target.output.file_name, strict, &mut diagnostics);
        debug!(
            target_name = %ctx.target.name,
            modules = bundle.modules.len(),
            externals = bundle.externals.len(),
            bytes = bundle.size(),
            "bundle rendered"
        );

        Ok(TransformOutput::with_diagnostics(Artifact::Bundle(bundle), diagnostics))
    }
}

/// `MISSING_EXPORT` for every named binding an importer asks for and the
/// imported module does not provide.
fn check_exports(graph: &ModuleGraph) -> Vec<Diagnostic> {
    let mut seen: FxHashSet<(ModuleId, ModuleId, String)> = FxHashSet::default();
    let mut diagnostics = Vec::new();

    for id in graph.execution_order() {
        let Some(module) = graph.module(&id) else { continue };
        for import in &module.imports {
            let Some(dep) = import.resolved_to.as_ref().and_then(|dep| graph.module(dep)) else {
                continue;
            };
            if dep.has_star_exports {
                continue;
            }
            for name in import.named_imports() {
                if dep.exports_name(name) {
                    continue;
                }
                if seen.insert((id.clone(), dep.id.clone(), name.to_string())) {
                    diagnostics.push(Diagnostic::missing_export(&id, &dep.id, name, &dep.exports));
                }
            }
        }
    }

    diagnostics
}

/// Warn about `require` calls that point into the bundle. Only the
/// `commonjs` transform can link them; left alone they fail at runtime.
fn check_requires(graph: &ModuleGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for id in graph.execution_order() {
        let Some(module) = graph.module(&id) else { continue };
        for import in module.imports.iter().filter(|i| i.kind == ImportKind::Require) {
            let Some(dep) = import.resolved_to.as_ref().filter(|dep| graph.contains(dep)) else {
                continue;
            };
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::TransformFailed,
                    format!("{id} requires {dep}, which is bundled; run the commonjs transform before bundle"),
                )
                .with_module(id.clone()),
            );
        }
    }
    diagnostics
}

/// Binding name holding a module's default export.
fn default_binding(id: &ModuleId) -> String {
    let sanitized: String = id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("__default_{sanitized}")
}

fn property(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        Value::String(name.to_string()).to_string()
    }
}

fn quoted(source: &str) -> String {
    Value::String(source.to_string()).to_string()
}

fn specifier_local(spec: &ImportSpecifier) -> &str {
    match spec {
        ImportSpecifier::Named { local, .. } | ImportSpecifier::Default(local) | ImportSpecifier::Namespace(local) => local,
    }
}

fn specifier_key(spec: &ImportSpecifier) -> &str {
    match spec {
        ImportSpecifier::Named { imported, .. } => imported,
        ImportSpecifier::Default(_) => "default",
        ImportSpecifier::Namespace(_) => "*",
    }
}

fn renamed_specifier(spec: &ImportSpecifier, renames: &FxHashMap<String, String>) -> ImportSpecifier {
    let local = |name: &String| renames.get(name).cloned().unwrap_or_else(|| name.clone());
    match spec {
        ImportSpecifier::Named { imported, local: name } => ImportSpecifier::Named {
            imported: imported.clone(),
            local: local(name),
        },
        ImportSpecifier::Default(name) => ImportSpecifier::Default(local(name)),
        ImportSpecifier::Namespace(name) => ImportSpecifier::Namespace(local(name)),
    }
}

/// Export name to the local binding written in the module itself, before
/// renaming. Re-exports are not included.
fn own_exports(module: &Module) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    match module.code() {
        Some(code) if module.source_type.is_script() => {
            for caps in DECL_NAME_RE.captures_iter(code) {
                if let Some(name) = caps.get(1) {
                    map.insert(name.as_str().to_string(), name.as_str().to_string());
                }
            }
            if DEFAULT_RE.is_match(code) {
                map.insert("default".to_string(), default_binding(&module.id));
            }
            for caps in LIST_RE.captures_iter(code) {
                if caps.get(2).is_some() {
                    continue;
                }
                let Some(list) = caps.get(1) else { continue };
                for (local, exported) in binding_pairs(list.as_str()) {
                    map.insert(exported, local);
                }
            }
        }
        _ => {
            map.insert("default".to_string(), default_binding(&module.id));
        }
    }
    map
}

/// Module source without import statements and export keywords.
fn strip_module_syntax(module: &Module, code: &str) -> String {
    let mut body = code.to_string();
    for import in module.imports.iter().filter(|i| i.kind != ImportKind::Require) {
        body = body.replacen(&import.statement, "", 1);
    }
    let default_var = format!("${{1}}var {} = ", default_binding(&module.id));
    body = DEFAULT_RE.replace_all(&body, default_var.as_str()).into_owned();
    body = DECL_RE.replace_all(&body, "${1}${2}").into_owned();
    LIST_RE.replace_all(&body, "").into_owned()
}

/// An import left for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExternalImport {
    source: String,
    specifiers: Vec<ImportSpecifier>,
}

struct Linker<'a> {
    graph: &'a ModuleGraph,
    format: OutputFormat,
    exports: FxHashMap<ModuleId, IndexMap<String, String>>,
    /// Stripped module bodies, before renaming
    bodies: FxHashMap<ModuleId, String>,
    /// Per module, top-level names that had to change
    renames: FxHashMap<ModuleId, FxHashMap<String, String>>,
}

impl<'a> Linker<'a> {
    fn new(graph: &'a ModuleGraph, format: OutputFormat) -> Self {
        Self {
            graph,
            format,
            exports: FxHashMap::default(),
            bodies: FxHashMap::default(),
            renames: FxHashMap::default(),
        }
    }

    fn renamed(&self, id: &ModuleId, local: &str) -> String {
        self.renames
            .get(id)
            .and_then(|renames| renames.get(local))
            .cloned()
            .unwrap_or_else(|| local.to_string())
    }

    /// Give every top-level binding of the bundle a unique name. Declarations
    /// claim names first, in execution order; an import that already refers
    /// to a binding of the same name shares it.
    fn assign_names(&mut self, order: &[ModuleId]) {
        let graph = self.graph;
        let scripts: Vec<&Module> = order
            .iter()
            .filter_map(|id| graph.module(id))
            .map(|module| module.as_ref())
            .filter(|module| module.source_type.is_script())
            .collect();

        let mut taken: FxHashSet<String> = FxHashSet::default();
        for module in &scripts {
            let Some(code) = module.code() else { continue };
            let body = strip_module_syntax(module, code);
            let mut renames = FxHashMap::default();
            for name in top_level_declarations(&body) {
                let unique = claim(&mut taken, &name);
                if unique != name {
                    renames.insert(name, unique);
                }
            }
            self.bodies.insert(module.id.clone(), body);
            self.renames.insert(module.id.clone(), renames);
        }

        let mut externals: FxHashMap<(String, String), String> = FxHashMap::default();
        for module in &scripts {
            let Some(mut renames) = self.renames.remove(&module.id) else { continue };
            for import in &module.imports {
                let dep = self.internal(import);
                for spec in &import.specifiers {
                    let local = specifier_local(spec);
                    let unique = match (import.kind, dep) {
                        (ImportKind::Static, Some(dep)) => {
                            let direct = match spec {
                                ImportSpecifier::Namespace(_) => None,
                                _ => graph
                                    .module(dep)
                                    .and_then(|dep_module| own_exports(dep_module).get(specifier_key(spec)).cloned())
                                    .map(|raw| self.renamed(dep, &raw)),
                            };
                            if direct.as_deref() == Some(local) {
                                continue;
                            }
                            claim(&mut taken, local)
                        }
                        (ImportKind::ReExport, Some(_)) => match spec {
                            ImportSpecifier::Namespace(ns) => claim(&mut taken, ns),
                            _ => continue,
                        },
                        (ImportKind::Require, _) => continue,
                        (_, None) => {
                            let key = (import.source.clone(), specifier_key(spec).to_string());
                            if externals.get(&key).is_some_and(|shared| shared == local) {
                                continue;
                            }
                            let unique = claim(&mut taken, local);
                            externals.entry(key).or_insert_with(|| unique.clone());
                            unique
                        }
                    };
                    if unique != local {
                        renames.insert(local.to_string(), unique);
                    }
                }
            }
            self.renames.insert(module.id.clone(), renames);
        }
    }

    fn internal<'i>(&self, import: &'i Import) -> Option<&'i ModuleId> {
        import.resolved_to.as_ref().filter(|id| self.graph.contains(id))
    }

    /// Export name to top-level binding for `id`.
    fn export_bindings(&mut self, id: &ModuleId, visiting: &mut FxHashSet<ModuleId>) -> IndexMap<String, String> {
        if let Some(cached) = self.exports.get(id) {
            return cached.clone();
        }
        let Some(module) = self.graph.module(id).cloned() else {
            return IndexMap::new();
        };
        if !visiting.insert(id.clone()) {
            return IndexMap::new();
        }

        let mut map: IndexMap<String, String> = own_exports(&module)
            .into_iter()
            .map(|(name, local)| (name, self.renamed(id, &local)))
            .collect();

        for import in module.imports.iter().filter(|i| i.kind == ImportKind::ReExport) {
            let dep = self.internal(import).cloned();
            if import.specifiers.is_empty() {
                if let Some(dep) = dep {
                    for (name, binding) in self.export_bindings(&dep, visiting) {
                        if name != "default" {
                            map.entry(name).or_insert(binding);
                        }
                    }
                }
                continue;
            }
            for spec in &import.specifiers {
                match spec {
                    ImportSpecifier::Named { imported, local } => {
                        let binding = match &dep {
                            Some(dep) => self.binding_of(dep, imported, visiting),
                            None => self.renamed(id, local),
                        };
                        map.insert(local.clone(), binding);
                    }
                    ImportSpecifier::Namespace(ns) | ImportSpecifier::Default(ns) => {
                        map.insert(ns.clone(), self.renamed(id, ns));
                    }
                }
            }
        }

        visiting.remove(id);
        self.exports.insert(id.clone(), map.clone());
        map
    }

    fn binding_of(&mut self, dep: &ModuleId, name: &str, visiting: &mut FxHashSet<ModuleId>) -> String {
        self.export_bindings(dep, visiting)
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn namespace_object(&mut self, dep: &ModuleId) -> String {
        let fields: Vec<String> = self
            .export_bindings(dep, &mut FxHashSet::default())
            .into_iter()
            .map(|(name, binding)| format!("{}: {binding}", property(&name)))
            .collect();
        format!("{{ {} }}", fields.join(", "))
    }

    /// Rewrite one module into a body without imports or exports.
    fn render_module(
        &mut self,
        id: &ModuleId,
        hoisted: &mut Vec<ExternalImport>,
        star_exports: &mut Vec<String>,
    ) -> Option<String> {
        let module = self.graph.module(id)?.clone();
        let body = self.bodies.get(id)?.clone();
        let renames = self.renames.get(id).cloned().unwrap_or_default();

        let mut links = Vec::new();
        for import in &module.imports {
            let dep = self.internal(import).cloned();

            match (import.kind, dep) {
                (ImportKind::Static, Some(dep)) => {
                    for spec in &import.specifiers {
                        let local = self.renamed(id, specifier_local(spec));
                        let binding = match spec {
                            ImportSpecifier::Default(_) => self.binding_of(&dep, "default", &mut FxHashSet::default()),
                            ImportSpecifier::Named { imported, .. } => {
                                self.binding_of(&dep, imported, &mut FxHashSet::default())
                            }
                            ImportSpecifier::Namespace(_) => self.namespace_object(&dep),
                        };
                        if local != binding {
                            links.push(format!("var {local} = {binding};"));
                        }
                    }
                }
                (ImportKind::ReExport, Some(dep)) => {
                    for spec in &import.specifiers {
                        if let ImportSpecifier::Namespace(ns) = spec {
                            let ns = self.renamed(id, ns);
                            links.push(format!("var {ns} = {};", self.namespace_object(&dep)));
                        }
                    }
                }
                (ImportKind::Static, None) => hoisted.push(ExternalImport {
                    source: import.source.clone(),
                    specifiers: import
                        .specifiers
                        .iter()
                        .map(|spec| renamed_specifier(spec, &renames))
                        .collect(),
                }),
                (ImportKind::ReExport, None) if import.specifiers.is_empty() => {
                    star_exports.push(import.source.clone());
                }
                (ImportKind::ReExport, None) => hoisted.push(ExternalImport {
                    source: import.source.clone(),
                    specifiers: import
                        .specifiers
                        .iter()
                        .map(|spec| match spec {
                            ImportSpecifier::Named { imported, local } if imported == "default" => {
                                renamed_specifier(&ImportSpecifier::Default(local.clone()), &renames)
                            }
                            other => renamed_specifier(other, &renames),
                        })
                        .collect(),
                }),
                (ImportKind::Require, _) => {}
            }
        }

        let body = rename_identifiers(&body, &renames);

        let mut rendered = format!("// {id}\n");
        for link in links {
            rendered.push_str(&link);
            rendered.push('\n');
        }
        rendered.push_str(body.trim());
        Some(rendered)
    }

    fn render_external(&self, import: &ExternalImport) -> Vec<String> {
        let source = quoted(&import.source);
        if import.specifiers.is_empty() {
            return vec![match self.format {
                OutputFormat::Esm => format!("import {source};"),
                OutputFormat::Cjs => format!("require({source});"),
            }];
        }

        let mut lines = Vec::new();
        let mut named = Vec::new();
        for spec in &import.specifiers {
            match (spec, self.format) {
                (ImportSpecifier::Default(local), OutputFormat::Esm) => {
                    lines.push(format!("import {local} from {source};"));
                }
                (ImportSpecifier::Namespace(local), OutputFormat::Esm) => {
                    lines.push(format!("import * as {local} from {source};"));
                }
                (ImportSpecifier::Default(local) | ImportSpecifier::Namespace(local), OutputFormat::Cjs) => {
                    lines.push(format!("const {local} = require({source});"));
                }
                (ImportSpecifier::Named { imported, local }, format) => {
                    named.push(match (imported == local, format) {
                        (true, _) => local.clone(),
                        (false, OutputFormat::Esm) => format!("{imported} as {local}"),
                        (false, OutputFormat::Cjs) => format!("{imported}: {local}"),
                    });
                }
            }
        }
        if !named.is_empty() {
            lines.push(match self.format {
                OutputFormat::Esm => format!("import {{ {} }} from {source};", named.join(", ")),
                OutputFormat::Cjs => format!("const {{ {} }} = require({source});", named.join(", ")),
            });
        }
        lines
    }

    fn link(&mut self, target: &str, file_name: &str, strict: bool, diagnostics: &mut Vec<Diagnostic>) -> Bundle {
        let order = self.graph.execution_order();
        self.assign_names(&order);
        let mut hoisted = Vec::new();
        let mut bodies = Vec::new();
        let mut included = Vec::new();
        let mut entry_stars: IndexSet<String> = IndexSet::new();

        for id in &order {
            let mut stars = Vec::new();
            match self.render_module(id, &mut hoisted, &mut stars) {
                Some(body) => {
                    bodies.push(body);
                    included.push(id.clone());
                }
                None => {
                    if let Some(module) = self.graph.module(id) {
                        if !module.source_type.is_script() && !self.graph.dependents(id).is_empty() {
                            diagnostics.push(
                                Diagnostic::warning(
                                    DiagnosticCode::TransformFailed,
                                    format!("{id} has no JavaScript representation and was left out of the bundle"),
                                )
                                .with_module(id.clone()),
                            );
                        }
                    }
                }
            }
            if self.graph.entries().contains(id) {
                entry_stars.extend(stars);
            }
        }

        let mut header: IndexSet<String> = IndexSet::new();
        let mut externals: IndexSet<String> = IndexSet::new();
        for import in &hoisted {
            externals.insert(import.source.clone());
            header.extend(self.render_external(import));
        }

        let mut exports: IndexMap<String, String> = IndexMap::new();
        if strict {
            for entry in self.graph.entries().to_vec() {
                for (name, binding) in self.export_bindings(&entry, &mut FxHashSet::default()) {
                    exports.entry(name).or_insert(binding);
                }
            }
        } else {
            entry_stars.clear();
        }
        externals.extend(entry_stars.iter().cloned());

        let mut code = String::new();
        if self.format == OutputFormat::Cjs {
            code.push_str("'use strict';\n\n");
        }
        for line in &header {
            code.push_str(line);
            code.push('\n');
        }
        if !header.is_empty() {
            code.push('\n');
        }
        code.push_str(&bodies.join("\n\n"));
        code.push('\n');
        code.push_str(&self.render_exports(&exports, &entry_stars));

        Bundle {
            target: target.to_string(),
            file_name: file_name.to_string(),
            format: self.format,
            code,
            modules: included,
            externals: externals.into_iter().collect(),
            exports: exports.keys().cloned().collect(),
        }
    }

    fn render_exports(&self, exports: &IndexMap<String, String>, stars: &IndexSet<String>) -> String {
        let mut out = String::new();
        match self.format {
            OutputFormat::Esm => {
                if !exports.is_empty() {
                    let list: Vec<String> = exports
                        .iter()
                        .map(|(name, binding)| {
                            if name == binding {
                                name.clone()
                            } else {
                                format!("{binding} as {name}")
                            }
                        })
                        .collect();
                    out.push_str(&format!("\nexport {{ {} }};\n", list.join(", ")));
                }
                for source in stars {
                    out.push_str(&format!("export * from {};\n", quoted(source)));
                }
            }
            OutputFormat::Cjs => {
                if !exports.is_empty() {
                    out.push('\n');
                }
                for (name, binding) in exports {
                    if is_identifier(name) {
                        out.push_str(&format!("exports.{name} = {binding};\n"));
                    } else {
                        out.push_str(&format!("exports[{}] = {binding};\n", quoted(name)));
                    }
                }
                for source in stars {
                    out.push_str(&format!("Object.assign(exports, require({}));\n", quoted(source)));
                }
            }
        }
        out
    }
}

/// Parse `a, b as c` into `(a, a)`, `(b, c)` pairs.
fn binding_pairs(list: &str) -> Vec<(String, String)> {
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
