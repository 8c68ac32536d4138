//! Writes a build report to disk.
//!
//! Bundles land at `<out_dir>/<output.dir>/<output.file>`, each emitted asset
//! once in its owner's output directory, and `asset-manifest.json` at the
//! root of `out_dir`. Every path is checked to stay inside `out_dir`, and all
//! files are written to temporaries first and renamed into place only when
//! every write succeeded.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use manifold_bundler::{BuildReport, OutputSpec};
use path_clean::PathClean;
use serde::Serialize;
use tracing::debug;

use crate::error::{CliError, Result};

pub const MANIFEST_FILE: &str = "asset-manifest.json";

/// One `asset-manifest.json` entry, keyed by the asset's source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to the output directory
    pub file: String,
    pub url: String,
    pub owner: String,
    pub content_type: String,
}

/// Paths written for one report.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub bundles: Vec<(String, PathBuf)>,
    pub assets: Vec<PathBuf>,
    pub manifest: Option<PathBuf>,
}

impl WriteSummary {
    pub fn bundle_path(&self, target: &str) -> Option<&Path> {
        self.bundles
            .iter()
            .find(|(name, _)| name == target)
            .map(|(_, path)| path.as_path())
    }
}

/// Write every built bundle, every emitted asset and optionally the manifest.
///
/// `outputs` maps target names to their output specs; failed targets write
/// nothing.
pub fn write_report(
    report: &BuildReport,
    outputs: &IndexMap<String, OutputSpec>,
    out_dir: &Path,
    manifest: bool,
) -> Result<WriteSummary> {
    let out_dir = absolute_dir(out_dir)?;
    let mut summary = WriteSummary::default();
    let manifest_json: String;
    let mut operations: Vec<(PathBuf, &[u8])> = Vec::new();

    for bundle in report.bundles() {
        let relative = outputs
            .get(&bundle.target)
            .map(OutputSpec::relative_path)
            .unwrap_or_else(|| PathBuf::from(&bundle.file_name));
        let path = contained_path(&out_dir, &relative)?;
        summary.bundles.push((bundle.target.clone(), path.clone()));
        operations.push((path, bundle.code.as_bytes()));
    }

    let mut entries: IndexMap<String, ManifestEntry> = IndexMap::new();
    for asset in &report.assets {
        let relative = owner_dir(outputs, &asset.owner).join(&asset.file_name);
        let path = contained_path(&out_dir, &relative)?;
        entries.insert(
            asset.asset_id.clone(),
            ManifestEntry {
                file: relative.to_string_lossy().replace('\\', "/"),
                url: asset.public_url.clone(),
                owner: asset.owner.clone(),
                content_type: asset.content_type.clone(),
            },
        );
        summary.assets.push(path.clone());
        operations.push((path, &asset.bytes[..]));
    }

    if manifest {
        manifest_json = serde_json::to_string_pretty(&entries)
            .context("failed to serialize the asset manifest")
            .map_err(CliError::Write)?;
        let path = out_dir.join(MANIFEST_FILE);
        summary.manifest = Some(path.clone());
        operations.push((path, manifest_json.as_bytes()));
    }

    write_files_atomic(&operations).map_err(CliError::Write)?;
    debug!(
        out_dir = %out_dir.display(),
        bundles = summary.bundles.len(),
        assets = summary.assets.len(),
        "build output written"
    );
    Ok(summary)
}

fn owner_dir(outputs: &IndexMap<String, OutputSpec>, owner: &str) -> PathBuf {
    outputs
        .get(owner)
        .and_then(|output| output.dir.clone())
        .unwrap_or_default()
}

fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();
    if cleaned.is_absolute() {
        Ok(cleaned)
    } else {
        Ok(std::env::current_dir()?.join(cleaned).clean())
    }
}

/// `relative` joined onto `base`, rejected when it resolves outside `base`.
fn contained_path(base: &Path, relative: &Path) -> Result<PathBuf> {
    let escapes = || CliError::OutputEscapes {
        path: relative.to_path_buf(),
        out_dir: base.to_path_buf(),
    };
    if relative.is_absolute() || relative.as_os_str().to_string_lossy().contains('\0') {
        return Err(escapes());
    }

    let full = base.join(relative).clean();
    if full == base || !full.starts_with(base) {
        return Err(escapes());
    }
    Ok(full)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write everything to temporaries, then rename them into place.
fn write_files_atomic(operations: &[(PathBuf, &[u8])]) -> anyhow::Result<()> {
    let mut written: Vec<(PathBuf, &Path)> = Vec::with_capacity(operations.len());

    let staged = (|| -> anyhow::Result<()> {
        for (path, content) in operations {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
            }
            let temp = temp_path(path);
            fs::write(&temp, content).with_context(|| format!("failed to write '{}'", temp.display()))?;
            written.push((temp, path.as_path()));
        }
        Ok(())
    })();
    if let Err(err) = staged {
        cleanup(&written);
        return Err(err);
    }

    for (temp, path) in &written {
        if let Err(err) = fs::rename(temp, path) {
            cleanup(&written);
            return Err(err).with_context(|| format!("failed to move '{}' into place", path.display()));
        }
    }
    Ok(())
}

fn cleanup(temps: &[(PathBuf, &Path)]) {
    for (temp, _) in temps {
        if temp.exists() {
            if let Err(err) = fs::remove_file(temp) {
                tracing::warn!(path = %temp.display(), "failed to remove temporary file: {err}");
            }
        }
    }
}
