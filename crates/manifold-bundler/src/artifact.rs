//! Values flowing through a transform chain.

use std::fmt;

use manifold_graph::{ModuleGraph, ModuleId};
use serde::{Deserialize, Serialize};

use crate::target::OutputFormat;

/// Kind of artifact a transform accepts or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Graph,
    Bundle,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Graph => "graph",
            ArtifactKind::Bundle => "bundle",
        })
    }
}

/// A module graph before bundling, or the bundle after it.
#[derive(Debug, Clone)]
pub enum Artifact {
    Graph(ModuleGraph),
    Bundle(Bundle),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Graph(_) => ArtifactKind::Graph,
            Artifact::Bundle(_) => ArtifactKind::Bundle,
        }
    }

    pub fn into_graph(self) -> Option<ModuleGraph> {
        match self {
            Artifact::Graph(graph) => Some(graph),
            Artifact::Bundle(_) => None,
        }
    }

    pub fn into_bundle(self) -> Option<Bundle> {
        match self {
            Artifact::Bundle(bundle) => Some(bundle),
            Artifact::Graph(_) => None,
        }
    }
}

/// One target's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub target: String,
    pub file_name: String,
    pub format: OutputFormat,
    pub code: String,
    /// Modules inlined into the bundle, in execution order
    pub modules: Vec<ModuleId>,
    /// External specifiers left for the runtime
    pub externals: Vec<String>,
    /// Names the bundle exports
    pub exports: Vec<String>,
}

impl Bundle {
    pub fn size(&self) -> usize {
        self.code.len()
    }

    pub fn contains_module(&self, id: &ModuleId) -> bool {
        self.modules.contains(id)
    }
}
