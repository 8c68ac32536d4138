//! Per-target resolution policy.
//!
//! Runs twice per target: `scope_to_target` narrows the shared graph to the
//! target's entries and main fields before any transform, and `enforce`
//! applies externals and deduplication at the graph to bundle boundary.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use manifold_graph::{Module, ModuleGraph, ModuleId};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::diagnostics::Diagnostic;
use crate::target::Target;

/// A target's graph breaks its resolution policy. Always fatal for the target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("cannot dedupe '{package}': no single shallowest copy of '{key}' ({})", .copies.join(", "))]
    DedupeConflict {
        package: String,
        key: String,
        copies: Vec<String>,
    },

    #[error(
        "'{specifier}' imported by {importer} resolves to external '{external}', which requires {{{}}} but the target assumes {{{}}}",
        join(.requires),
        join(.runtime_assumed)
    )]
    DisallowedExternal {
        specifier: String,
        importer: String,
        external: String,
        requires: BTreeSet<String>,
        runtime_assumed: BTreeSet<String>,
    },
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Point the graph at the target's entries and drop everything else.
///
/// Entries missing from the graph become `UNRESOLVED_ENTRY` errors.
pub(crate) fn scope_to_target(mut graph: ModuleGraph, target: &Target) -> (ModuleGraph, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut entries = Vec::with_capacity(target.entries.len());

    for entry in &target.entries {
        match ModuleId::new(entry.trim_start_matches("./")) {
            Ok(id) if graph.contains(&id) => entries.push(id),
            _ => diagnostics.push(Diagnostic::unresolved_entry(entry)),
        }
    }

    graph.set_entries(entries);
    let redirected = graph.apply_aliases(&target.resolution.main_fields);
    let removed = graph.retain_reachable();
    debug!(
        target_name = %target.name,
        kept = graph.len(),
        dropped = removed.len(),
        redirected,
        "graph scoped to target"
    );
    (graph, diagnostics)
}

/// Apply externals and deduplication, then drop unreachable modules.
pub(crate) fn enforce(graph: ModuleGraph, target: &Target) -> Result<(ModuleGraph, Vec<Diagnostic>), PolicyViolation> {
    let (graph, diagnostics) = apply_externals(graph, target)?;
    let mut graph = apply_dedupe(graph, target)?;
    graph.retain_reachable();
    Ok((graph, diagnostics))
}

fn apply_externals(mut graph: ModuleGraph, target: &Target) -> Result<(ModuleGraph, Vec<Diagnostic>), PolicyViolation> {
    let mut diagnostics = Vec::new();
    let mut seen: FxHashSet<(ModuleId, String)> = FxHashSet::default();
    let mut rewritten = Vec::new();

    for module in graph.modules() {
        let mut externalized: Vec<&str> = Vec::new();
        for import in &module.imports {
            if let Some(external) = target.external_for(&import.source) {
                if !target.resolution.allows(external) {
                    return Err(PolicyViolation::DisallowedExternal {
                        specifier: import.source.clone(),
                        importer: module.id.to_string(),
                        external: external.id.clone(),
                        requires: external.requires.clone(),
                        runtime_assumed: target.resolution.runtime_assumed.clone(),
                    });
                }
                if import.resolved_to.is_some() {
                    externalized.push(&import.source);
                }
                continue;
            }

            let resolved = import.resolved_to.as_ref().is_some_and(|dep| graph.contains(dep));
            if !resolved && seen.insert((module.id.clone(), import.source.clone())) {
                diagnostics.push(Diagnostic::unresolved_import(&import.source, &module.id));
            }
        }

        if !externalized.is_empty() {
            let mut next = Module::clone(module);
            for source in externalized {
                next.resolve_import(source, None);
            }
            rewritten.push(next);
        }
    }

    for module in rewritten {
        graph.add_module(module);
    }
    Ok((graph, diagnostics))
}

fn apply_dedupe(mut graph: ModuleGraph, target: &Target) -> Result<ModuleGraph, PolicyViolation> {
    if target.resolution.dedupe.is_empty() {
        return Ok(graph);
    }

    let mut groups: IndexMap<(String, String), Vec<ModuleId>> = IndexMap::new();
    for module in graph.modules() {
        let (Some(package), Some(key)) = (module.id.package_name(), module.id.logical_key()) else {
            continue;
        };
        if target.resolution.dedupes(package) {
            groups
                .entry((package.to_string(), key.to_string()))
                .or_default()
                .push(module.id.clone());
        }
    }

    let mut canonical: FxHashMap<ModuleId, ModuleId> = FxHashMap::default();
    for ((package, key), mut copies) in groups {
        if copies.len() < 2 {
            continue;
        }
        copies.sort_by(|a, b| {
            a.nesting_depth()
                .cmp(&b.nesting_depth())
                .then_with(|| a.as_str().cmp(b.as_str()))
        });

        let keep = &copies[0];
        let depth = keep.nesting_depth();
        let content = |id: &ModuleId| graph.module(id).map(|m| m.content.as_bytes().to_vec());
        let keep_bytes = content(keep);
        let tied: Vec<&ModuleId> = copies.iter().take_while(|copy| copy.nesting_depth() == depth).collect();
        if tied.iter().any(|copy| content(copy) != keep_bytes) {
            return Err(PolicyViolation::DedupeConflict {
                package,
                key,
                copies: tied.iter().map(ToString::to_string).collect(),
            });
        }

        let divergent = copies[1..].iter().filter(|copy| content(copy) != keep_bytes).count();
        debug!(
            target_name = %target.name,
            package = %package,
            key = %key,
            kept = %keep,
            collapsed = copies.len() - 1,
            divergent,
            "deduplicated copies"
        );
        for copy in &copies[1..] {
            canonical.insert(copy.clone(), keep.clone());
        }
    }

    if canonical.is_empty() {
        return Ok(graph);
    }

    let rewritten: Vec<Module> = graph
        .modules()
        .filter(|module| {
            module
                .imports
                .iter()
                .any(|import| import.resolved_to.as_ref().is_some_and(|dep| canonical.contains_key(dep)))
        })
        .map(|module| {
            let mut next = Module::clone(module);
            for import in &mut next.imports {
                if let Some(keep) = import.resolved_to.as_ref().and_then(|dep| canonical.get(dep)) {
                    import.resolved_to = Some(keep.clone());
                }
            }
            next
        })
        .collect();
    for module in rewritten {
        graph.add_module(module);
    }

    let entries: Vec<ModuleId> = graph
        .entries()
        .iter()
        .map(|entry| canonical.get(entry).unwrap_or(entry).clone())
        .collect();
    graph.set_entries(entries);
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::target::{ExternalSpec, RuntimeEnvironment};

    fn id(path: &str) -> ModuleId {
        ModuleId::new(path).unwrap()
    }

    fn module(path: &str, code: &str, resolutions: &[(&str, &str)]) -> Module {
        let mut module = Module::from_source(id(path), manifold_graph::SourceType::JavaScript, code);
        for (source, target) in resolutions {
            module.resolve_import(source, Some(id(target)));
        }
        module
    }

    #[test]
    fn missing_entries_are_reported() {
        let graph = ModuleGraph::from_modules([module("src/client.js", "start();\n", &[])]);
        let target = Target::new("client").entries(["./src/client.js", "src/missing.js"]);
        let (graph, diagnostics) = scope_to_target(graph, &target);

        assert_eq!(graph.entries(), [id("src/client.js")]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnresolvedEntry);
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn scoping_drops_other_targets_modules() {
        let graph = ModuleGraph::from_modules([
            module("src/client.js", "import './shared.js';\n", &[("./shared.js", "src/shared.js")]),
            module("src/shared.js", "export const x = 1;\n", &[]),
            module("src/server.js", "export const y = 2;\n", &[]),
        ]);
        let (graph, _) = scope_to_target(graph, &Target::new("client").entry("src/client.js"));
        assert!(graph.contains(&id("src/shared.js")));
        assert!(!graph.contains(&id("src/server.js")));
    }

    #[test]
    fn scoping_follows_the_target_main_fields() {
        let mut graph = ModuleGraph::from_modules([
            module(
                "src/app.js",
                "import { get } from 'http-lite';\n",
                &[("http-lite", "node_modules/http-lite/lib/node.js")],
            ),
            module("node_modules/http-lite/lib/node.js", "export const get = 1;\n", &[]),
            module("node_modules/http-lite/lib/browser.js", "export const get = 2;\n", &[]),
        ]);
        graph.add_alias(
            "browser",
            id("node_modules/http-lite/lib/node.js"),
            id("node_modules/http-lite/lib/browser.js"),
        );

        let (client, _) = scope_to_target(graph.clone(), &Target::new("client").entry("src/app.js"));
        assert!(client.contains(&id("node_modules/http-lite/lib/browser.js")));
        assert!(!client.contains(&id("node_modules/http-lite/lib/node.js")));

        let server = Target::new("server")
            .environment(RuntimeEnvironment::Node)
            .entry("src/app.js");
        let (server, _) = scope_to_target(graph, &server);
        assert!(server.contains(&id("node_modules/http-lite/lib/node.js")));
        assert!(!server.contains(&id("node_modules/http-lite/lib/browser.js")));
    }

    #[test]
    fn disallowed_external_is_a_violation() {
        let graph = ModuleGraph::from_modules([module("src/app.js", "import fs from 'fs';\n", &[])])
            .with_entries([id("src/app.js")]);
        let client = Target::new("client")
            .entry("src/app.js")
            .external(ExternalSpec::node_builtin("fs"));

        let err = enforce(graph.clone(), &client).unwrap_err();
        assert!(matches!(err, PolicyViolation::DisallowedExternal { ref external, .. } if external == "fs"));

        let server = client.environment(RuntimeEnvironment::Node);
        let (_, diagnostics) = enforce(graph, &server).unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn externals_are_not_inlined() {
        let graph = ModuleGraph::from_modules([
            module(
                "src/app.js",
                "import { writable } from 'svelte/store';\n",
                &[("svelte/store", "node_modules/svelte/store/index.mjs")],
            ),
            module("node_modules/svelte/store/index.mjs", "export function writable() {}\n", &[]),
        ])
        .with_entries([id("src/app.js")]);
        let target = Target::new("server").external(ExternalSpec::new("svelte"));

        let (graph, diagnostics) = enforce(graph, &target).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.module(&id("src/app.js")).unwrap().imports[0].resolved_to, None);
    }

    #[test]
    fn unresolved_imports_warn_once() {
        let graph = ModuleGraph::from_modules([module(
            "src/app.js",
            "import a from 'left-pad';\nimport { b } from 'left-pad';\n",
            &[],
        )])
        .with_entries([id("src/app.js")]);
        let (_, diagnostics) = enforce(graph, &Target::new("client")).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnresolvedImport);
    }

    #[test]
    fn identical_copies_collapse_to_the_shallowest() {
        let graph = ModuleGraph::from_modules([
            module(
                "src/app.js",
                "import './node_modules/ui/index.js';\nimport 'svelte/internal';\n",
                &[
                    ("./node_modules/ui/index.js", "node_modules/ui/index.js"),
                    ("svelte/internal", "node_modules/svelte/internal.js"),
                ],
            ),
            module(
                "node_modules/ui/index.js",
                "import 'svelte/internal';\n",
                &[("svelte/internal", "node_modules/ui/node_modules/svelte/internal.js")],
            ),
            module("node_modules/ui/node_modules/svelte/internal.js", "export const noop = 0;\n", &[]),
            module("node_modules/svelte/internal.js", "export const noop = 0;\n", &[]),
        ])
        .with_entries([id("src/app.js")]);

        let (graph, _) = enforce(graph, &Target::new("client").dedupe("svelte")).unwrap();
        assert!(graph.contains(&id("node_modules/svelte/internal.js")));
        assert!(!graph.contains(&id("node_modules/ui/node_modules/svelte/internal.js")));
        assert_eq!(
            graph.dependencies(&id("node_modules/ui/index.js")),
            [id("node_modules/svelte/internal.js")]
        );
    }

    #[test]
    fn divergent_copies_collapse_to_the_root_copy() {
        let graph = ModuleGraph::from_modules([
            module(
                "src/app.js",
                "import 'svelte';\nimport 'ui';\n",
                &[("svelte", "node_modules/svelte/index.js"), ("ui", "node_modules/ui/index.js")],
            ),
            module(
                "node_modules/ui/index.js",
                "import 'svelte';\n",
                &[("svelte", "node_modules/ui/node_modules/svelte/index.js")],
            ),
            module("node_modules/svelte/index.js", "export const version = 4;\n", &[]),
            module("node_modules/ui/node_modules/svelte/index.js", "export const version = 3;\n", &[]),
        ])
        .with_entries([id("src/app.js")]);

        let (graph, _) = enforce(graph, &Target::new("client").dedupe("svelte")).unwrap();
        assert!(graph.contains(&id("node_modules/svelte/index.js")));
        assert!(!graph.contains(&id("node_modules/ui/node_modules/svelte/index.js")));
        assert_eq!(
            graph.dependencies(&id("node_modules/ui/index.js")),
            [id("node_modules/svelte/index.js")]
        );
    }

    #[test]
    fn divergent_copies_without_a_shallowest_conflict() {
        let graph = ModuleGraph::from_modules([
            module(
                "src/app.js",
                "import 'ui';\nimport 'widgets';\n",
                &[("ui", "node_modules/ui/index.js"), ("widgets", "node_modules/widgets/index.js")],
            ),
            module(
                "node_modules/ui/index.js",
                "import 'svelte';\n",
                &[("svelte", "node_modules/ui/node_modules/svelte/index.js")],
            ),
            module(
                "node_modules/widgets/index.js",
                "import 'svelte';\n",
                &[("svelte", "node_modules/widgets/node_modules/svelte/index.js")],
            ),
            module("node_modules/ui/node_modules/svelte/index.js", "export const version = 4;\n", &[]),
            module("node_modules/widgets/node_modules/svelte/index.js", "export const version = 3;\n", &[]),
        ])
        .with_entries([id("src/app.js")]);

        let err = enforce(graph, &Target::new("client").dedupe("svelte")).unwrap_err();
        assert_eq!(
            err,
            PolicyViolation::DedupeConflict {
                package: "svelte".into(),
                key: "svelte/index.js".into(),
                copies: vec![
                    "node_modules/ui/node_modules/svelte/index.js".into(),
                    "node_modules/widgets/node_modules/svelte/index.js".into()
                ],
            }
        );
    }
}
