//! Target descriptors.
//!
//! This module defines the core types for build targets:
//! - `RuntimeEnvironment`: Where the bundle will execute
//! - `ResolutionPolicy`: Capabilities the runtime provides, `package.json` fields
//!   consulted for packages, and packages forced to one copy
//! - `ExternalSpec`: Modules left to the runtime, with their capability requirements
//! - `OutputSpec`: Shape of the emitted bundle
//! - `Target`: One named bundle variant built from the shared graph

use std::collections::BTreeSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::substitution::SubstitutionValue;
use crate::transform::TransformRef;

/// Environment where the bundle will execute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Browser main thread
    #[default]
    Browser,
    /// Node.js (full APIs)
    Node,
    /// Service worker / web worker
    Worker,
}

impl RuntimeEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Node => "node",
            Self::Worker => "worker",
        }
    }

    /// Capabilities assumed when a target declares none.
    pub fn default_capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::Browser => &["browser"],
            Self::Node => &["node"],
            Self::Worker => &["browser", "worker"],
        }
    }

    /// `package.json` fields consulted for bare specifiers, in priority order.
    pub fn default_main_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Browser | Self::Worker => &["browser", "module", "main"],
            Self::Node => &["module", "main"],
        }
    }

    /// Default value of `process.browser`.
    pub fn is_browser_like(&self) -> bool {
        !matches!(self, Self::Node)
    }
}

/// Node.js built-in modules, externalized by `Target::node_builtins`.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Returns `true` for `fs`, `fs/promises`, `node:fs` and friends.
pub fn is_node_builtin(specifier: &str) -> bool {
    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    let root = bare.split('/').next().unwrap_or(bare);
    NODE_BUILTINS.contains(&root)
}

/// A module excluded from bundling and resolved by the runtime instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalSpec {
    pub id: String,
    /// Capabilities the runtime must provide to load the module
    #[serde(default)]
    pub requires: BTreeSet<String>,
}

impl ExternalSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            requires: BTreeSet::new(),
        }
    }

    pub fn requiring<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Node built-in requiring the `node` capability.
    pub fn node_builtin(id: &str) -> Self {
        Self::new(id).requiring(["node"])
    }

    /// Exact id, a sub-path of it, or its `node:` spelling.
    pub fn matches(&self, specifier: &str) -> bool {
        let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
        [specifier, bare].into_iter().any(|candidate| {
            candidate == self.id
                || candidate
                    .strip_prefix(self.id.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Module resolution constraints for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    /// Capability tags the runtime provides (`browser`, `node`, `worker`)
    pub runtime_assumed: BTreeSet<String>,
    /// `package.json` fields honoured for bare specifiers, highest priority first
    #[serde(default)]
    pub main_fields: Vec<String>,
    /// Packages collapsed to a single copy
    pub dedupe: BTreeSet<String>,
}

impl ResolutionPolicy {
    /// Whether the runtime can load `external`.
    pub fn allows(&self, external: &ExternalSpec) -> bool {
        external.requires.is_subset(&self.runtime_assumed)
    }

    pub fn dedupes(&self, package: &str) -> bool {
        self.dedupe.contains(package)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Esm,
    Cjs,
}

/// Whether entry exports survive bundling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySignatures {
    /// Keep entry exports exactly as written
    Strict,
    /// Entries may lose their exports
    #[default]
    False,
}

/// Where and how the bundle is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub file_name: String,
    pub format: OutputFormat,
    pub preserve_entry_signatures: EntrySignatures,
    /// Directory relative to the output root, used by writers
    pub dir: Option<PathBuf>,
}

impl OutputSpec {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            format: OutputFormat::default(),
            preserve_entry_signatures: EntrySignatures::default(),
            dir: None,
        }
    }

    /// Bundle path relative to the output root.
    pub fn relative_path(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.join(&self.file_name),
            None => PathBuf::from(&self.file_name),
        }
    }
}

/// One named bundle variant.
///
/// Targets are built once at configuration time and never mutated during a
/// build.
///
/// ```
/// use manifold_bundler::{ExternalSpec, RuntimeEnvironment, Target};
///
/// let server = Target::new("server")
///     .environment(RuntimeEnvironment::Node)
///     .entry("src/server.js")
///     .node_builtins();
///
/// assert!(server.external_for("node:fs").is_some());
/// assert!(server.resolution.allows(&ExternalSpec::node_builtin("fs")));
/// ```
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub environment: RuntimeEnvironment,
    pub entries: Vec<String>,
    pub output: OutputSpec,
    pub resolution: ResolutionPolicy,
    pub externals: Vec<ExternalSpec>,
    /// Substitutions layered over the base table
    pub defines: IndexMap<String, SubstitutionValue>,
    pub transforms: Vec<TransformRef>,
}

impl Target {
    /// A browser target writing `<name>.js`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let environment = RuntimeEnvironment::default();
        Self {
            output: OutputSpec::new(format!("{name}.js")),
            name,
            environment,
            entries: Vec::new(),
            resolution: ResolutionPolicy {
                runtime_assumed: capabilities(environment),
                main_fields: main_fields(environment),
                dedupe: BTreeSet::new(),
            },
            externals: Vec::new(),
            defines: IndexMap::new(),
            transforms: Vec::new(),
        }
    }

    /// Set the environment and reset assumed capabilities and main fields
    /// to its defaults.
    pub fn environment(mut self, environment: RuntimeEnvironment) -> Self {
        self.environment = environment;
        self.resolution.runtime_assumed = capabilities(environment);
        self.resolution.main_fields = main_fields(environment);
        self
    }

    /// Replace the `package.json` fields honoured for bare specifiers.
    pub fn main_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolution.main_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn entry(mut self, entry: impl Into<String>) -> Self {
        self.entries.push(entry.into());
        self
    }

    pub fn entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, output: OutputSpec) -> Self {
        self.output = output;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.output.format = format;
        self
    }

    pub fn preserve_entry_signatures(mut self, signatures: EntrySignatures) -> Self {
        self.output.preserve_entry_signatures = signatures;
        self
    }

    /// Replace the assumed runtime capabilities.
    pub fn runtime_assumed<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolution.runtime_assumed = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn dedupe(mut self, package: impl Into<String>) -> Self {
        self.resolution.dedupe.insert(package.into());
        self
    }

    pub fn external(mut self, external: ExternalSpec) -> Self {
        if !self.externals.iter().any(|e| e.id == external.id) {
            self.externals.push(external);
        }
        self
    }

    /// Externalize every Node built-in as requiring `node`.
    pub fn node_builtins(mut self) -> Self {
        for builtin in NODE_BUILTINS {
            self = self.external(ExternalSpec::node_builtin(builtin));
        }
        self
    }

    pub fn define(mut self, token: impl Into<String>, value: SubstitutionValue) -> Self {
        self.defines.insert(token.into(), value);
        self
    }

    pub fn transform(mut self, transform: TransformRef) -> Self {
        self.transforms.push(transform);
        self
    }

    /// The declared external `specifier` refers to, if any.
    pub fn external_for(&self, specifier: &str) -> Option<&ExternalSpec> {
        self.externals.iter().find(|external| external.matches(specifier))
    }
}

fn main_fields(environment: RuntimeEnvironment) -> Vec<String> {
    environment
        .default_main_fields()
        .iter()
        .map(|f| (*f).to_string())
        .collect()
}

fn capabilities(environment: RuntimeEnvironment) -> BTreeSet<String> {
    environment
        .default_capabilities()
        .iter()
        .map(|c| (*c).to_string())
        .collect()
}
