//! Subscriber setup for binaries that embed the bundler.
//!
//! Only compiled with the `logging` feature. The library itself just emits
//! tracing events; [`init_logging`] installs a compact stderr subscriber
//! filtered to the manifold crates.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const VERBOSE_FILTER: &str =
    "manifold=debug,manifold_cli=debug,manifold_bundler=debug,manifold_config=debug,manifold_graph=debug";
const QUIET_FILTER: &str = "manifold=error,manifold_cli=error";
const DEFAULT_FILTER: &str = "manifold=info,manifold_cli=info";

/// How much of the build to trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors from the binary only
    Quiet,
    /// The binary's own progress events; `RUST_LOG` replaces this default
    #[default]
    Normal,
    /// Debug events from every manifold crate
    Verbose,
}

impl LogLevel {
    /// `verbose` wins over `quiet`.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => LogLevel::Verbose,
            (false, true) => LogLevel::Quiet,
            (false, false) => LogLevel::Normal,
        }
    }

    fn directives(self, rust_log: Option<String>) -> String {
        match self {
            LogLevel::Verbose => VERBOSE_FILTER.to_string(),
            LogLevel::Quiet => QUIET_FILTER.to_string(),
            LogLevel::Normal => rust_log
                .filter(|directives| !directives.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
        }
    }
}

/// Install the global subscriber. Only the first call in a process has any
/// effect.
pub fn init_logging(level: LogLevel, ansi: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::new(level.directives(std::env::var("RUST_LOG").ok()));
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_ansi(ansi)
            .with_writer(std::io::stderr)
            .compact();

        tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    });
}
