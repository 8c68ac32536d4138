//! Invocation options: defaults < `MANIFOLD_*` environment < flags.
//!
//! The defaults themselves come from `NODE_ENV` and `MANIFOLD_LEGACY_BUILD`,
//! so a plain `NODE_ENV=development manifold build` behaves like the
//! environment-driven builds the configuration was written for.

use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Serialized};
use manifold_bundler::{BuildFlags, BuildMode};
use serde::{Deserialize, Serialize};

use crate::cli::ProjectArgs;

pub const ENV_PREFIX: &str = "MANIFOLD_";

/// Options fixed once per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOptions {
    pub mode: BuildMode,

    #[serde(default)]
    pub legacy: bool,

    /// Overrides `settings.out_dir`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Profile merged over the configuration; defaults to the mode's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Values given on the command line; unset flags leave lower layers alone.
#[derive(Debug, Default, Serialize)]
struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<BuildMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    legacy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
}

impl InvocationOptions {
    /// Layer the process environment and `project` flags over the defaults.
    pub fn load(project: &ProjectArgs, out_dir: Option<PathBuf>) -> Result<Self, figment::Error> {
        Self::figment(BuildFlags::from_env(), project, out_dir).extract()
    }

    /// Build the provider stack from explicit environment defaults.
    pub fn figment(defaults: BuildFlags, project: &ProjectArgs, out_dir: Option<PathBuf>) -> Figment {
        let defaults = InvocationOptions {
            mode: defaults.mode,
            legacy: defaults.legacy,
            out_dir: None,
            profile: None,
        };
        let overrides = FlagOverrides {
            mode: project.mode.map(BuildMode::from),
            legacy: project.legacy.then_some(true),
            out_dir,
            profile: project.profile.clone(),
        };

        Figment::new()
            .merge(Serialized::defaults(defaults))
            .merge(Env::prefixed(ENV_PREFIX).only(&["mode", "legacy", "out_dir", "profile"]))
            .merge(Serialized::defaults(overrides))
    }

    pub fn flags(&self) -> BuildFlags {
        BuildFlags::new(self.mode, self.legacy)
    }

    /// Profile to materialize: the explicit one, or the build mode's name.
    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or(self.mode.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ModeArg;
    use serial_test::serial;

    fn clear_env() {
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            for key in ["MANIFOLD_MODE", "MANIFOLD_LEGACY", "MANIFOLD_OUT_DIR", "MANIFOLD_PROFILE"] {
                std::env::remove_var(key);
            }
        }
    }

    fn extract(defaults: BuildFlags, project: &ProjectArgs, out_dir: Option<PathBuf>) -> InvocationOptions {
        InvocationOptions::figment(defaults, project, out_dir).extract().unwrap()
    }

    #[test]
    #[serial]
    fn defaults_come_from_the_build_environment() {
        clear_env();
        let options = extract(BuildFlags::new(BuildMode::Development, true), &ProjectArgs::default(), None);
        assert_eq!(options.mode, BuildMode::Development);
        assert!(options.legacy);
        assert_eq!(options.profile(), "development");
        assert_eq!(options.out_dir, None);
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();
        // SAFETY: serialized with the other environment tests.
        unsafe {
            std::env::set_var("MANIFOLD_MODE", "development");
            std::env::set_var("MANIFOLD_OUT_DIR", "dist");
        }
        let options = extract(BuildFlags::production(), &ProjectArgs::default(), None);
        clear_env();

        assert_eq!(options.mode, BuildMode::Development);
        assert_eq!(options.out_dir, Some(PathBuf::from("dist")));
    }

    #[test]
    #[serial]
    fn flags_override_environment() {
        clear_env();
        // SAFETY: serialized with the other environment tests.
        unsafe {
            std::env::set_var("MANIFOLD_MODE", "development");
            std::env::set_var("MANIFOLD_PROFILE", "staging");
        }
        let project = ProjectArgs {
            mode: Some(ModeArg::Production),
            legacy: true,
            ..ProjectArgs::default()
        };
        let options = extract(BuildFlags::development(), &project, Some(PathBuf::from("out")));
        clear_env();

        assert_eq!(options.flags(), BuildFlags::new(BuildMode::Production, true));
        assert_eq!(options.profile(), "staging");
        assert_eq!(options.out_dir, Some(PathBuf::from("out")));
    }

    #[test]
    #[serial]
    fn malformed_mode_is_rejected() {
        clear_env();
        // SAFETY: serialized with the other environment tests.
        unsafe {
            std::env::set_var("MANIFOLD_MODE", "staging");
        }
        let result = InvocationOptions::figment(BuildFlags::production(), &ProjectArgs::default(), None)
            .extract::<InvocationOptions>();
        clear_env();
        assert!(result.is_err());
    }
}
