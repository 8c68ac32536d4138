//! Value-type module graph shared read-only by every target.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet as HashSet;

use super::dependency_chain::DependencyChain;
use super::{GraphError, Module, ModuleId};

/// The source module graph.
///
/// Modules are stored behind `Arc`, so cloning a graph for a target is cheap
/// and transforms that rewrite a handful of modules only pay for those.
/// Iteration follows insertion order, which keeps every derived output
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    modules: IndexMap<ModuleId, Arc<Module>>,
    entries: Vec<ModuleId>,
    /// Per `package.json` field (`browser`, ...), module replacements that
    /// field asks for
    aliases: BTreeMap<String, IndexMap<ModuleId, ModuleId>>,
}

impl ModuleGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a graph from modules; edges come from each module's resolved imports.
    pub fn from_modules<I>(modules: I) -> Self
    where
        I: IntoIterator<Item = Module>,
    {
        let mut graph = Self::new();
        for module in modules {
            graph.add_module(module);
        }
        graph
    }

    /// Builder-style entry declaration.
    pub fn with_entries<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = ModuleId>,
    {
        self.set_entries(entries);
        self
    }

    /// Replace the entry list. Duplicates are dropped, order is kept.
    pub fn set_entries<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = ModuleId>,
    {
        self.entries.clear();
        for entry in entries {
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
            }
        }
    }

    /// Entry modules in declaration order.
    pub fn entries(&self) -> &[ModuleId] {
        &self.entries
    }

    /// Record that resolving with `field` replaces `from` by `to`.
    pub fn add_alias(&mut self, field: impl Into<String>, from: ModuleId, to: ModuleId) {
        self.aliases.entry(field.into()).or_default().insert(from, to);
    }

    /// Fields with recorded replacements.
    pub fn alias_fields(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// Point every edge and entry at the replacement the first listed field
    /// provides. Returns the number of edges rewritten.
    pub fn apply_aliases<S: AsRef<str>>(&mut self, fields: &[S]) -> usize {
        let mut replacements: IndexMap<ModuleId, ModuleId> = IndexMap::new();
        for field in fields {
            if let Some(aliases) = self.aliases.get(field.as_ref()) {
                for (from, to) in aliases {
                    replacements.entry(from.clone()).or_insert_with(|| to.clone());
                }
            }
        }
        if replacements.is_empty() {
            return 0;
        }

        let mut rewritten = 0;
        for slot in self.modules.values_mut() {
            let redirected = slot
                .imports
                .iter()
                .any(|import| import.resolved_to.as_ref().is_some_and(|dep| replacements.contains_key(dep)));
            if !redirected {
                continue;
            }
            let mut module = Module::clone(slot.as_ref());
            for import in &mut module.imports {
                if let Some(to) = import.resolved_to.as_ref().and_then(|dep| replacements.get(dep)) {
                    import.resolved_to = Some(to.clone());
                    rewritten += 1;
                }
            }
            *slot = Arc::new(module);
        }

        let entries: Vec<ModuleId> = self
            .entries
            .iter()
            .map(|entry| replacements.get(entry).unwrap_or(entry).clone())
            .collect();
        self.set_entries(entries);
        rewritten
    }

    /// Add (or overwrite) a module.
    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.id.clone(), Arc::new(module));
    }

    /// Replace an existing module, keeping its position.
    pub fn replace_module(&mut self, module: Module) -> Result<(), GraphError> {
        match self.modules.get_mut(&module.id) {
            Some(slot) => {
                *slot = Arc::new(module);
                Ok(())
            }
            None => Err(GraphError::UnknownModule(module.id.to_string())),
        }
    }

    /// Remove a module, preserving the order of the rest.
    pub fn remove_module(&mut self, id: &ModuleId) -> Option<Arc<Module>> {
        self.entries.retain(|entry| entry != id);
        self.modules.shift_remove(id)
    }

    pub fn module(&self, id: &ModuleId) -> Option<&Arc<Module>> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All modules in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    /// Resolved dependencies of a module, in import order and without duplicates.
    pub fn dependencies(&self, id: &ModuleId) -> Vec<ModuleId> {
        let Some(module) = self.modules.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::default();
        module
            .imports
            .iter()
            .filter_map(|import| import.resolved_to.as_ref())
            .filter(|target| self.modules.contains_key(*target))
            .filter(|target| seen.insert((*target).clone()))
            .cloned()
            .collect()
    }

    /// Modules importing `id`.
    pub fn dependents(&self, id: &ModuleId) -> Vec<ModuleId> {
        self.modules
            .values()
            .filter(|module| {
                module
                    .imports
                    .iter()
                    .any(|import| import.resolved_to.as_ref() == Some(id))
            })
            .map(|module| module.id.clone())
            .collect()
    }

    /// Modules reachable from the entries, in breadth-first discovery order.
    pub fn reachable(&self) -> Vec<ModuleId> {
        let mut seen: HashSet<ModuleId> = HashSet::default();
        let mut order = Vec::new();
        let mut queue: std::collections::VecDeque<ModuleId> = self
            .entries
            .iter()
            .filter(|entry| self.modules.contains_key(*entry))
            .cloned()
            .collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for dep in self.dependencies(&id) {
                if !seen.contains(&dep) {
                    queue.push_back(dep);
                }
            }
            order.push(id);
        }

        order
    }

    /// Drop every module not reachable from the entries. Returns the removed ids.
    pub fn retain_reachable(&mut self) -> Vec<ModuleId> {
        let keep: HashSet<ModuleId> = self.reachable().into_iter().collect();
        let removed: Vec<ModuleId> = self
            .modules
            .keys()
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect();
        self.modules.retain(|id, _| keep.contains(id));
        removed
    }

    /// Execution order from the entries: every module comes after its
    /// dependencies, except where a cycle forces otherwise.
    pub fn execution_order(&self) -> Vec<ModuleId> {
        let mut visited: HashSet<ModuleId> = HashSet::default();
        let mut order = Vec::new();

        for entry in &self.entries {
            if !self.modules.contains_key(entry) || visited.contains(entry) {
                continue;
            }

            // Iterative post-order DFS: (module, its deps, next dep index)
            let mut stack: Vec<(ModuleId, Vec<ModuleId>, usize)> = Vec::new();
            visited.insert(entry.clone());
            stack.push((entry.clone(), self.dependencies(entry), 0));

            while let Some((id, deps, next)) = stack.last_mut() {
                if let Some(dep) = deps.get(*next).cloned() {
                    *next += 1;
                    if visited.insert(dep.clone()) {
                        let dep_deps = self.dependencies(&dep);
                        stack.push((dep, dep_deps, 0));
                    }
                } else {
                    order.push(id.clone());
                    stack.pop();
                }
            }
        }

        order
    }

    /// Import cycles reachable from the entries.
    ///
    /// Each cycle is reported once, rotated so that it starts at its
    /// lexicographically smallest member. The returned chains end with the
    /// module that closes the loop.
    pub fn cycles(&self) -> Vec<DependencyChain> {
        let mut found: Vec<Vec<ModuleId>> = Vec::new();
        let mut finished: HashSet<ModuleId> = HashSet::default();

        for entry in &self.entries {
            if !self.modules.contains_key(entry) || finished.contains(entry) {
                continue;
            }

            let mut path: Vec<ModuleId> = vec![entry.clone()];
            let mut stack: Vec<(Vec<ModuleId>, usize)> = vec![(self.dependencies(entry), 0)];

            while let Some((deps, next)) = stack.last_mut() {
                if let Some(dep) = deps.get(*next).cloned() {
                    *next += 1;
                    if let Some(pos) = path.iter().position(|p| p == &dep) {
                        let cycle = canonical_cycle(&path[pos..]);
                        if !found.contains(&cycle) {
                            found.push(cycle);
                        }
                    } else if !finished.contains(&dep) {
                        stack.push((self.dependencies(&dep), 0));
                        path.push(dep);
                    }
                } else {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        finished.insert(done);
                    }
                }
            }
        }

        found
            .into_iter()
            .map(|mut members| {
                if let Some(first) = members.first().cloned() {
                    members.push(first);
                }
                DependencyChain::new(members)
            })
            .collect()
    }
}

/// Rotate a cycle so it starts at its smallest member.
fn canonical_cycle(members: &[ModuleId]) -> Vec<ModuleId> {
    let start = members
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    members[start..]
        .iter()
        .chain(members[..start].iter())
        .cloned()
        .collect()
}
