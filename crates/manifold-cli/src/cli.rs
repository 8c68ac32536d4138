//! Command-line interface definition.
//!
//! - `manifold build` - build every declared target and write the outputs
//! - `manifold check` - validate the configuration and plan without building

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use manifold_bundler::BuildMode;

/// Manifold - build several differently-constrained bundles from one source tree
#[derive(Parser, Debug)]
#[command(
    name = "manifold",
    version,
    about = "Build several differently-constrained bundles from one source tree",
    long_about = "Manifold loads a project's module graph once and builds every declared\n\
                  target (browser client, server entry, service worker, ...) from it, with\n\
                  per-target substitutions, externals, transform chains and one shared\n\
                  diagnostic stream."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every target and write bundles, assets and the asset manifest
    Build(BuildArgs),

    /// Validate the configuration and print the build plan
    Check(CheckArgs),
}

/// Options shared by `build` and `check`.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Path to manifold.toml or a package.json with a `manifold` field
    ///
    /// Defaults to discovery in the project directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project directory
    ///
    /// Entries and asset directories are resolved against it. Defaults to the
    /// directory holding --config, or the current directory.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Build mode (overrides NODE_ENV and MANIFOLD_MODE)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Enable legacy output (overrides MANIFOLD_LEGACY_BUILD)
    #[arg(long)]
    pub legacy: bool,

    /// Configuration profile to apply; defaults to the build mode's name
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Only these targets (repeatable)
    #[arg(short, long = "target", value_name = "NAME")]
    pub targets: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Output directory (overrides settings.out_dir)
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "prod")]
    Production,
}

impl From<ModeArg> for BuildMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Development => BuildMode::Development,
            ModeArg::Production => BuildMode::Production,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_build_flags() {
        let cli = Cli::try_parse_from([
            "manifold", "build", "--mode", "dev", "--legacy", "-t", "client", "-t", "server", "-d", "out",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.project.mode, Some(ModeArg::Development));
        assert!(args.project.legacy);
        assert_eq!(args.project.targets, ["client", "server"]);
        assert_eq!(args.out_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["manifold", "-v", "-q", "check"]).is_err());
    }
}
