//! File access abstraction for the graph loader.
//!
//! The loader never touches the filesystem directly; it goes through a
//! `Runtime`, so graphs can be loaded from disk (`NativeRuntime`) or from an
//! in-memory file table in tests.

pub mod native;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Runtime error: {0}")]
    Other(String),
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
}

/// Platform runtime trait.
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file.
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Get file metadata.
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Returns `true` if `path` exists and is a regular file.
    async fn is_file(&self, path: &Path) -> bool {
        self.metadata(path).await.is_ok_and(|meta| meta.is_file)
    }
}
