use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const VIRTUAL_PREFIX: &str = "virtual:";
const NODE_MODULES: &str = "node_modules/";

/// Canonical identifier for a module in the source graph.
///
/// Identifiers are project-relative, `/`-separated and cleaned of `.` and `..`
/// components, so the same file always maps to the same id no matter how an
/// importer spelled it. Virtual modules keep their `virtual:` prefix and skip
/// normalisation altogether.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Create a new module identifier from a project-relative path.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ModuleIdError> {
        let raw = path.as_ref();

        if raw.is_empty() {
            return Err(ModuleIdError::EmptyPath);
        }

        if raw.starts_with(VIRTUAL_PREFIX) {
            return Ok(Self(Arc::from(raw)));
        }

        Self::from_path(Path::new(&raw.replace('\\', "/")))
    }

    /// Create a module identifier from a filesystem-style path.
    pub fn from_path(path: &Path) -> Result<Self, ModuleIdError> {
        if path.as_os_str().is_empty() {
            return Err(ModuleIdError::EmptyPath);
        }

        let cleaned: PathBuf = path.to_path_buf().clean();
        let mut segments = Vec::new();
        for component in cleaned.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::ParentDir => {
                    return Err(ModuleIdError::OutsideRoot(path.to_string_lossy().into_owned()));
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        if segments.is_empty() {
            return Err(ModuleIdError::EmptyPath);
        }

        Ok(Self(Arc::from(segments.join("/"))))
    }

    /// Create a module identifier for a virtual module (e.g. `virtual:routes`).
    pub fn new_virtual(id: impl Into<String>) -> Self {
        let id = id.into();
        let normalized = if id.starts_with(VIRTUAL_PREFIX) {
            id
        } else {
            format!("{VIRTUAL_PREFIX}{id}")
        };
        Self(Arc::from(normalized))
    }

    /// Borrow the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier represents a virtual module.
    pub fn is_virtual(&self) -> bool {
        self.0.starts_with(VIRTUAL_PREFIX)
    }

    /// Lower-cased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(self.as_str())
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    /// Directory part of the identifier (`""` for top-level modules).
    pub fn parent(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Path of the module below its innermost `node_modules/` directory.
    ///
    /// Two copies of the same package installed at different depths share
    /// this key, which is what deduplication compares.
    ///
    /// ```
    /// use manifold_graph::ModuleId;
    ///
    /// let nested = ModuleId::new("node_modules/ui/node_modules/svelte/internal.js").unwrap();
    /// assert_eq!(nested.logical_key(), Some("svelte/internal.js"));
    /// ```
    pub fn logical_key(&self) -> Option<&str> {
        let idx = self.0.rfind(NODE_MODULES)?;
        let key = &self.0[idx + NODE_MODULES.len()..];
        (!key.is_empty()).then_some(key)
    }

    /// Package the module belongs to, scoped names included.
    pub fn package_name(&self) -> Option<&str> {
        let key = self.logical_key()?;
        let mut slashes = key.match_indices('/').map(|(idx, _)| idx);
        let end = if key.starts_with('@') {
            slashes.nth(1)
        } else {
            slashes.next()
        };
        Some(match end {
            Some(end) => &key[..end],
            None => key,
        })
    }

    /// How many `node_modules/` directories the module is nested in.
    pub fn nesting_depth(&self) -> usize {
        self.0.matches(NODE_MODULES).count()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ModuleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        ModuleId::new(value).map_err(serde::de::Error::custom)
    }
}

/// Error type for `ModuleId` construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleIdError {
    /// The provided path was empty.
    #[error("module id path is empty")]
    EmptyPath,

    /// The path climbs above the project root.
    #[error("module path '{0}' escapes the project root")]
    OutsideRoot(String),
}
