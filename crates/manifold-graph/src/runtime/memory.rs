//! In-memory `Runtime` used by tests and embedders.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use super::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// File table keyed by path. Directories are implied by file paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuntime {
    files: Arc<RwLock<HashMap<PathBuf, Arc<[u8]>>>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style file insertion.
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl AsRef<[u8]>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl AsRef<[u8]>) {
        self.files
            .write()
            .insert(path.into(), Arc::from(content.as_ref()));
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.files
            .read()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

#[async_trait]
impl Runtime for MemoryRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| RuntimeError::FileNotFound(path.to_path_buf()))
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        if let Some(bytes) = self.files.read().get(path) {
            return Ok(FileMetadata {
                size: bytes.len() as u64,
                is_dir: false,
                is_file: true,
            });
        }

        if self.is_directory(path) {
            return Ok(FileMetadata {
                size: 0,
                is_dir: true,
                is_file: false,
            });
        }

        Err(RuntimeError::FileNotFound(path.to_path_buf()))
    }
}
