//! Global configuration settings shared across profiles.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub log_level: Option<String>,

    /// Base output directory; targets without `output.dir` write below it
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Write `asset-manifest.json` next to the bundles
    #[serde(default = "default_true")]
    pub asset_manifest: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_level: None,
            out_dir: default_out_dir(),
            asset_manifest: true,
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_true() -> bool {
    true
}
