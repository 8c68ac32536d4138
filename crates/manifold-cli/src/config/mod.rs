//! Locating, loading and converting a project's configuration.

mod conversions;
mod options;

use std::path::{Path, PathBuf};

use manifold_bundler::{DiagnosticRouter, Target, TransformRegistry};
use manifold_config::{ConfigDiscovery, ConfigError, ManifoldConfig, load_file, validate_schema};
use tracing::{debug, info};

pub use conversions::{router_from_config, target_from_config};
pub use options::{ENV_PREFIX, InvocationOptions};

use crate::cli::ProjectArgs;
use crate::error::{CliError, Result};

/// A loaded project: where it lives, its profile-merged configuration and
/// the options of this invocation.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: ManifoldConfig,
    pub options: InvocationOptions,
}

impl Project {
    /// Resolve options, find the configuration and merge the active profile.
    pub fn load(args: &ProjectArgs, out_dir: Option<PathBuf>) -> Result<Self> {
        let options = InvocationOptions::load(args, out_dir)?;
        let (root, config_path) = locate(args)?;

        let config = load_file(&config_path)?.materialize_profile(Some(options.profile()))?;
        validate_schema(&config)?;

        info!(
            config = %config_path.display(),
            mode = %options.mode,
            legacy = options.legacy,
            profile = options.profile(),
            targets = config.targets.len(),
            "configuration loaded"
        );
        Ok(Self {
            root,
            config_path,
            config,
            options,
        })
    }

    /// Convert the declared targets, keeping only `selected` when non-empty.
    pub fn targets(&self, registry: &TransformRegistry, selected: &[String]) -> Result<Vec<Target>> {
        for name in selected {
            if self.config.target(name).is_none() {
                return Err(CliError::UnknownTarget {
                    name: name.clone(),
                    available: self.config.targets.iter().map(|t| t.name.clone()).collect(),
                });
            }
        }

        self.config
            .targets
            .iter()
            .filter(|target| selected.is_empty() || selected.contains(&target.name))
            .map(|target| target_from_config(target, registry))
            .collect()
    }

    pub fn router(&self) -> DiagnosticRouter {
        router_from_config(&self.config.diagnostics)
    }

    /// Output root: `--out-dir`, `MANIFOLD_OUT_DIR` or `settings.out_dir`,
    /// relative to the project root.
    pub fn out_dir(&self) -> PathBuf {
        let dir = self
            .options
            .out_dir
            .clone()
            .unwrap_or_else(|| self.config.settings.out_dir.clone());
        self.root.join(dir)
    }
}

/// Project root and configuration file for `args`.
fn locate(args: &ProjectArgs) -> Result<(PathBuf, PathBuf)> {
    let cwd = std::env::current_dir()?;

    let (root, config_path) = match &args.config {
        Some(config) => {
            let config = cwd.join(config);
            if !config.is_file() {
                return Err(ConfigError::NotFound.into());
            }
            let root = match &args.cwd {
                Some(dir) => cwd.join(dir),
                None => config.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.clone()),
            };
            (root, config)
        }
        None => {
            let root = args.cwd.as_ref().map(|dir| cwd.join(dir)).unwrap_or_else(|| cwd.clone());
            let config = ConfigDiscovery::new(&root).find().ok_or(ConfigError::NotFound)?;
            (root, config)
        }
    };

    debug!(root = %root.display(), config = %config_path.display(), "project located");
    Ok((root, config_path))
}
