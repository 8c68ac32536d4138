//! Target declarations (`[[targets]]`).

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One named output bundle.
///
/// ```toml
/// [[targets]]
/// name = "server"
/// environment = "node"
/// entries = ["src/server.js"]
/// runtime = ["node"]
/// main_fields = ["module", "main"]
/// node_builtins = true
///
/// [targets.output]
/// file = "server.js"
/// format = "cjs"
/// preserve_entry_signatures = "strict"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,

    #[serde(default)]
    pub environment: EnvironmentKind,

    /// Project-relative entry modules, in order
    #[serde(default)]
    pub entries: Vec<String>,

    #[serde(default)]
    pub output: OutputConfig,

    /// Capabilities the target's runtime provides (`browser`, `node`, ...)
    #[serde(default)]
    pub runtime: Vec<String>,

    /// `package.json` fields honoured for packages, highest priority first.
    /// Empty means the environment's default.
    #[serde(default)]
    pub main_fields: Vec<String>,

    /// Packages collapsed to a single copy
    #[serde(default)]
    pub dedupe: Vec<String>,

    #[serde(default)]
    pub externals: Vec<ExternalConfig>,

    /// Treat every Node built-in module as an external requiring `node`
    #[serde(default)]
    pub node_builtins: bool,

    /// Per-target substitution overrides
    #[serde(default)]
    pub define: IndexMap<String, DefineValue>,

    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: EnvironmentKind::default(),
            entries: Vec::new(),
            output: OutputConfig::default(),
            runtime: Vec::new(),
            main_fields: Vec::new(),
            dedupe: Vec::new(),
            externals: Vec::new(),
            node_builtins: false,
            define: IndexMap::new(),
            transforms: Vec::new(),
        }
    }

    /// Output file name, defaulting to `<name>.js`.
    pub fn output_file(&self) -> String {
        self.output
            .file
            .clone()
            .unwrap_or_else(|| format!("{}.js", self.name))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    #[default]
    Browser,
    Node,
    Worker,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for this target, relative to the project root
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub format: FormatKind,

    #[serde(default)]
    pub preserve_entry_signatures: EntrySignatures,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Esm,
    Cjs,
}

/// `preserve_entry_signatures`: `"strict"` or `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntrySignatures {
    Strict,
    #[default]
    False,
}

impl Serialize for EntrySignatures {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            EntrySignatures::Strict => serializer.serialize_str("strict"),
            EntrySignatures::False => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for EntrySignatures {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Mode(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Ok(EntrySignatures::False),
            Raw::Mode(mode) if mode == "strict" => Ok(EntrySignatures::Strict),
            Raw::Mode(mode) if mode == "false" => Ok(EntrySignatures::False),
            Raw::Flag(true) => Err(serde::de::Error::custom(
                "preserve_entry_signatures must be \"strict\" or false",
            )),
            Raw::Mode(other) => Err(serde::de::Error::custom(format!(
                "unknown preserve_entry_signatures value '{other}', expected \"strict\" or false"
            ))),
        }
    }
}

/// External module: `"fs"` or `{ id = "fs", requires = ["node"] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalConfig {
    Id(String),
    Detailed {
        id: String,
        #[serde(default)]
        requires: Vec<String>,
    },
}

impl ExternalConfig {
    pub fn id(&self) -> &str {
        match self {
            ExternalConfig::Id(id) | ExternalConfig::Detailed { id, .. } => id,
        }
    }

    pub fn requires(&self) -> &[String] {
        match self {
            ExternalConfig::Id(_) => &[],
            ExternalConfig::Detailed { requires, .. } => requires,
        }
    }
}

/// Substitution value: booleans and numbers are rendered literally,
/// strings are quoted, `{ raw = "..." }` is inserted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefineValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Raw { raw: String },
}

/// Transform entry in a target's chain.
///
/// ```toml
/// [[targets.transforms]]
/// name = "minify"
/// enabled = "!dev"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub name: String,

    /// `true`/`false` or a condition such as `"production && legacy"`
    #[serde(default)]
    pub enabled: GateConfig,

    /// Transform-specific options
    #[serde(default)]
    pub options: Value,
}

impl TransformConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: GateConfig::default(),
            options: Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateConfig {
    Flag(bool),
    Condition(String),
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig::Flag(true)
    }
}
