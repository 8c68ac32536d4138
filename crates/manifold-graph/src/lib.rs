//! # manifold-graph
//!
//! The source module graph every build target starts from.
//!
//! A graph is loaded once per invocation and handed to each target as an
//! immutable value. Targets clone it cheaply (modules sit behind `Arc`) and
//! rewrite their own copy through the transform chain.
//!
//! ```text
//!   entries ──▶ GraphLoader ──▶ ModuleGraph ──▶ target 1 (clone)
//!                  │                        ├─▶ target 2 (clone)
//!               Runtime                     └─▶ target 3 (clone)
//!          (native fs / memory)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use manifold_graph::{Module, ModuleGraph, ModuleId, SourceType};
//!
//! let main = ModuleId::new("src/main.js").unwrap();
//! let mut module = Module::from_source(
//!     main.clone(),
//!     SourceType::JavaScript,
//!     "import { start } from './app.js';\nstart();\n",
//! );
//! module.resolve_import("./app.js", Some(ModuleId::new("src/app.js").unwrap()));
//!
//! let graph = ModuleGraph::from_modules([
//!     module,
//!     Module::from_source(
//!         ModuleId::new("src/app.js").unwrap(),
//!         SourceType::JavaScript,
//!         "export function start() {}\n",
//!     ),
//! ])
//! .with_entries([main]);
//!
//! let order: Vec<_> = graph.execution_order().iter().map(|id| id.to_string()).collect();
//! assert_eq!(order, ["src/app.js", "src/main.js"]);
//! ```

pub mod dependency_chain;
pub mod graph;
pub mod loader;
pub mod module;
pub mod module_id;
pub mod runtime;
pub mod scan;

pub use dependency_chain::DependencyChain;
pub use graph::ModuleGraph;
pub use loader::GraphLoader;
pub use module::{Content, Import, ImportKind, ImportSpecifier, Module, SourceType};
pub use module_id::{ModuleId, ModuleIdError};
pub use scan::{ScanResult, is_identifier, scan_module};

pub use runtime::native::NativeRuntime;
pub use runtime::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

#[cfg(any(test, feature = "test-utils"))]
pub use runtime::memory::MemoryRuntime;

/// Errors raised while building or editing a module graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    ModuleId(#[from] ModuleIdError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A text module is not valid UTF-8.
    #[error("module '{0}' is not valid UTF-8")]
    InvalidUtf8(String),

    /// The module is not part of the graph.
    #[error("unknown module '{0}'")]
    UnknownModule(String),
}

#[cfg(test)]
mod tests;
