//! Import chains through the module graph.
//!
//! Used to describe cycles in diagnostics and to explain why a module ended
//! up in a bundle.

use rustc_hash::FxHashSet as HashSet;
use serde::{Deserialize, Serialize};

use super::ModuleId;

/// A path of modules connected by imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyChain {
    /// The path of module IDs, importer first
    pub path: Vec<ModuleId>,
    /// Depth of this chain (path length - 1)
    pub depth: usize,
}

impl DependencyChain {
    pub fn new(path: Vec<ModuleId>) -> Self {
        let depth = path.len().saturating_sub(1);
        Self { path, depth }
    }

    pub fn first(&self) -> Option<&ModuleId> {
        self.path.first()
    }

    pub fn last(&self) -> Option<&ModuleId> {
        self.path.last()
    }

    /// Check if the same module appears twice.
    pub fn has_cycle(&self) -> bool {
        let mut seen = HashSet::default();
        self.path.iter().any(|module| !seen.insert(module))
    }

    /// Distinct members of the chain, in path order.
    pub fn members(&self) -> Vec<&ModuleId> {
        let mut seen = HashSet::default();
        self.path.iter().filter(|m| seen.insert(*m)).collect()
    }

    /// The single package every member belongs to, if there is one.
    ///
    /// A cycle that never leaves `node_modules/@framework/internal` is
    /// scoped to `@framework/internal`; a cycle touching application code or
    /// two packages has no scope.
    pub fn common_package(&self) -> Option<&str> {
        let mut packages = self.path.iter().map(ModuleId::package_name);
        let first = packages.next()??;
        packages
            .all(|pkg| pkg == Some(first))
            .then_some(first)
    }

    /// Format the chain as `entry.js -> utils.js -> helper.js`.
    pub fn format_chain(&self) -> String {
        self.path
            .iter()
            .map(ModuleId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
