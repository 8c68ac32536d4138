//! Builds a `ModuleGraph` by following imports from a set of entries.
//!
//! Resolution follows Node conventions: relative specifiers are resolved
//! against the importer with extension and `index` probing, bare specifiers
//! walk up `node_modules/` directories and honour `package.json` main
//! fields. `node:` specifiers and anything that cannot be found stay
//! unresolved and are left for the bundler's resolution policy.
//!
//! Alias fields (`browser`) are resolved for every package the graph reaches
//! and recorded as replacements on the graph; the modules they point at are
//! loaded too, so each target can pick its own resolution from one graph.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashSet as HashSet;
use tracing::{debug, warn};

use super::runtime::{Runtime, RuntimeError};
use super::{GraphError, Module, ModuleGraph, ModuleId, SourceType};

const RESOLVE_EXTENSIONS: &[&str] = &["mjs", "js", "json", "svelte"];
const DEFAULT_MAIN_FIELDS: &[&str] = &["module", "main"];

/// Loads the shared source graph through a `Runtime`.
#[derive(Debug, Clone)]
pub struct GraphLoader {
    runtime: Arc<dyn Runtime>,
    root: PathBuf,
    main_fields: Vec<String>,
    alias_fields: Vec<String>,
}

impl GraphLoader {
    /// Create a loader reading files below `root`.
    pub fn new(runtime: Arc<dyn Runtime>, root: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            root: root.into(),
            main_fields: DEFAULT_MAIN_FIELDS.iter().map(|f| f.to_string()).collect(),
            alias_fields: Vec::new(),
        }
    }

    /// `package.json` fields whose replacements are recorded on the graph
    /// instead of being applied. Fields already used as main fields are
    /// ignored.
    pub fn with_alias_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alias_fields = fields
            .into_iter()
            .map(Into::into)
            .filter(|field| !self.main_fields.contains(field))
            .collect();
        self.alias_fields.dedup();
        self
    }

    /// Override the `package.json` fields consulted for bare specifiers.
    pub fn with_main_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.main_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Load every module reachable from `entries`.
    ///
    /// Entries that do not exist are skipped with a warning: whether a
    /// missing entry is fatal is decided per target by the bundler.
    pub async fn load<I, S>(&self, entries: I) -> Result<ModuleGraph, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut graph = ModuleGraph::new();
        let mut found_entries = Vec::new();
        let mut seen: HashSet<ModuleId> = HashSet::default();
        let mut queue: VecDeque<ModuleId> = VecDeque::new();

        for entry in entries {
            let id = ModuleId::new(entry.as_ref())?;
            if !self.runtime.is_file(&self.root.join(id.as_str())).await {
                warn!(entry = %id, "entry module not found");
                continue;
            }
            if seen.insert(id.clone()) {
                queue.push_back(id.clone());
            }
            found_entries.push(id);
        }

        self.drain(&mut graph, &mut seen, &mut queue).await?;

        if !self.alias_fields.is_empty() {
            let mut packages: HashSet<String> = HashSet::default();
            loop {
                let pending: Vec<String> = graph
                    .modules()
                    .filter_map(|module| package_dir(&module.id))
                    .filter(|dir| packages.insert(dir.clone()))
                    .collect();
                if pending.is_empty() {
                    break;
                }
                for dir in pending {
                    for (field, from, to) in self.package_aliases(&dir).await {
                        debug!(field = %field, from = %from, to = %to, "recorded alias");
                        if seen.insert(to.clone()) {
                            queue.push_back(to.clone());
                        }
                        graph.add_alias(field, from, to);
                    }
                }
                self.drain(&mut graph, &mut seen, &mut queue).await?;
            }
        }

        debug!(modules = graph.len(), "source graph loaded");
        Ok(graph.with_entries(found_entries))
    }

    /// Read and resolve every queued module, queueing what it imports.
    async fn drain(
        &self,
        graph: &mut ModuleGraph,
        seen: &mut HashSet<ModuleId>,
        queue: &mut VecDeque<ModuleId>,
    ) -> Result<(), GraphError> {
        while let Some(id) = queue.pop_front() {
            let mut module = self.read_module(&id).await?;

            let specifiers: Vec<String> = module
                .imports
                .iter()
                .map(|import| import.source.clone())
                .collect();
            for specifier in specifiers {
                let resolved = self.resolve(&specifier, &id).await;
                debug!(
                    importer = %id,
                    specifier = %specifier,
                    resolved = resolved.as_ref().map(ModuleId::as_str),
                    "resolved import"
                );
                if let Some(target) = &resolved {
                    if seen.insert(target.clone()) {
                        queue.push_back(target.clone());
                    }
                }
                module.resolve_import(&specifier, resolved);
            }

            graph.add_module(module);
        }
        Ok(())
    }

    /// Replacements the alias fields of the package at `dir` ask for.
    ///
    /// A string value replaces the package's main entry; an object maps
    /// package-relative files to their replacements.
    async fn package_aliases(&self, dir: &str) -> Vec<(String, ModuleId, ModuleId)> {
        let manifest = self.root.join(dir).join("package.json");
        let Some(json) = self.read_manifest(&manifest).await else {
            return Vec::new();
        };

        let mut aliases = Vec::new();
        for field in &self.alias_fields {
            match json.get(field) {
                Some(serde_json::Value::String(path)) => {
                    let main = self.main_field(&json);
                    let from = self.find_file(&join(dir, main.as_deref().unwrap_or("index.js"))).await;
                    let to = self.find_file(&join(dir, path.trim_start_matches("./"))).await;
                    if let (Some(from), Some(to)) = (from, to) {
                        if from != to {
                            aliases.push((field.clone(), from, to));
                        }
                    }
                }
                Some(serde_json::Value::Object(map)) => {
                    for (from, to) in map {
                        let (Some(to), true) = (to.as_str(), from.starts_with("./")) else {
                            continue;
                        };
                        let from = self.find_file(&join(dir, from.trim_start_matches("./"))).await;
                        let to = self.find_file(&join(dir, to.trim_start_matches("./"))).await;
                        if let (Some(from), Some(to)) = (from, to) {
                            if from != to {
                                aliases.push((field.clone(), from, to));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        aliases
    }

    async fn read_module(&self, id: &ModuleId) -> Result<Module, GraphError> {
        let bytes = self.runtime.read_file(&self.root.join(id.as_str())).await?;
        let source_type = id
            .extension()
            .map(|ext| SourceType::from_extension(&ext))
            .unwrap_or(SourceType::JavaScript);

        if !source_type.is_text() {
            return Ok(Module::asset(id.clone(), bytes));
        }

        let code = String::from_utf8(bytes).map_err(|_| GraphError::InvalidUtf8(id.to_string()))?;
        Ok(Module::from_source(id.clone(), source_type, code))
    }

    /// Resolve `specifier` imported from `importer`.
    pub async fn resolve(&self, specifier: &str, importer: &ModuleId) -> Option<ModuleId> {
        if specifier.starts_with("node:") || specifier.is_empty() {
            return None;
        }

        if specifier.starts_with("./") || specifier.starts_with("../") {
            let joined = join(importer.parent(), specifier);
            let base = ModuleId::new(joined).ok()?;
            return self.find_file(base.as_str()).await;
        }

        if specifier.starts_with('/') {
            let base = ModuleId::new(specifier).ok()?;
            return self.find_file(base.as_str()).await;
        }

        self.resolve_package(specifier, importer).await
    }

    async fn resolve_package(&self, specifier: &str, importer: &ModuleId) -> Option<ModuleId> {
        let (package, subpath) = split_package(specifier);

        for dir in ancestors(importer.parent()) {
            let package_dir = join(&dir, &format!("node_modules/{package}"));

            if let Some(subpath) = subpath {
                if let Some(found) = self.find_file(&join(&package_dir, subpath)).await {
                    return Some(found);
                }
                continue;
            }

            let manifest = self.root.join(&package_dir).join("package.json");
            if self.runtime.is_file(&manifest).await {
                let main = self.main_entry(&manifest).await;
                let target = join(&package_dir, main.as_deref().unwrap_or("index.js"));
                if let Some(found) = self.find_file(&target).await {
                    return Some(found);
                }
            }
            if let Some(found) = self.find_file(&package_dir).await {
                return Some(found);
            }
        }

        None
    }

    async fn main_entry(&self, manifest: &std::path::Path) -> Option<String> {
        let json = self.read_manifest(manifest).await?;
        self.main_field(&json)
    }

    fn main_field(&self, json: &serde_json::Value) -> Option<String> {
        self.main_fields
            .iter()
            .find_map(|field| json.get(field).and_then(|v| v.as_str()))
            .map(str::to_string)
    }

    async fn read_manifest(&self, manifest: &std::path::Path) -> Option<serde_json::Value> {
        let bytes = match self.runtime.read_file(manifest).await {
            Ok(bytes) => bytes,
            Err(RuntimeError::FileNotFound(_)) => return None,
            Err(err) => {
                warn!(path = %manifest.display(), error = %err, "cannot read package.json");
                return None;
            }
        };
        serde_json::from_slice(&bytes).ok()
    }

    /// Find the file a project-relative path refers to.
    async fn find_file(&self, base: &str) -> Option<ModuleId> {
        let base = ModuleId::new(base).ok()?;
        let mut candidates = vec![base.as_str().to_string()];
        candidates.extend(RESOLVE_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}")));
        candidates.extend(
            RESOLVE_EXTENSIONS
                .iter()
                .map(|ext| format!("{base}/index.{ext}")),
        );

        for candidate in candidates {
            if self.runtime.is_file(&self.root.join(&candidate)).await {
                return ModuleId::new(candidate).ok();
            }
        }
        None
    }
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `Some("sub/path")`).
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut end = None;
    for (count, (idx, _)) in specifier.match_indices('/').enumerate() {
        if count + 1 == segments {
            end = Some(idx);
            break;
        }
    }
    match end {
        Some(idx) => (&specifier[..idx], Some(&specifier[idx + 1..])),
        None => (specifier, None),
    }
}

/// `node_modules/ui/node_modules/svelte/index.js` -> `node_modules/ui/node_modules/svelte`.
fn package_dir(id: &ModuleId) -> Option<String> {
    let package = id.package_name()?;
    let key = id.logical_key()?;
    let prefix = &id.as_str()[..id.as_str().len() - key.len()];
    Some(format!("{prefix}{package}"))
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// `src/routes` -> [`src/routes`, `src`, ``], skipping `node_modules` dirs themselves.
fn ancestors(dir: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = dir.to_string();
    loop {
        if !current.ends_with("node_modules") {
            out.push(current.clone());
        }
        match current.rfind('/') {
            Some(idx) => current.truncate(idx),
            None if !current.is_empty() => current.clear(),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_package_specifiers() {
        assert_eq!(split_package("svelte"), ("svelte", None));
        assert_eq!(split_package("svelte/store"), ("svelte", Some("store")));
        assert_eq!(
            split_package("@framework/internal"),
            ("@framework/internal", None)
        );
        assert_eq!(
            split_package("@framework/internal/router.js"),
            ("@framework/internal", Some("router.js"))
        );
    }

    #[test]
    fn package_dirs_use_the_innermost_package() {
        let dir = |path: &str| package_dir(&ModuleId::new(path).unwrap());
        assert_eq!(dir("node_modules/ui/lib/index.js").as_deref(), Some("node_modules/ui"));
        assert_eq!(
            dir("node_modules/ui/node_modules/@scope/pkg/a.js").as_deref(),
            Some("node_modules/ui/node_modules/@scope/pkg")
        );
        assert_eq!(dir("src/app.js"), None);
    }

    #[test]
    fn ancestors_walk_to_root() {
        assert_eq!(ancestors("src/routes"), vec!["src/routes", "src", ""]);
        assert_eq!(ancestors(""), vec![""]);
        assert_eq!(
            ancestors("node_modules/ui/lib"),
            vec!["node_modules/ui/lib", "node_modules/ui", ""]
        );
    }
}
