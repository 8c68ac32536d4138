//! Logging setup for the CLI.
//!
//! The build report is rendered by [`crate::ui`]; tracing output is for
//! following what the bundler does. Without flags only the CLI's own events
//! are shown, `--verbose` opens up every manifold crate at debug level and
//! `RUST_LOG` overrides the default filter.

use manifold_bundler::logging::{LogLevel, init_logging};

/// Install the global subscriber. Call once, before any logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logging(level(verbose, quiet), !no_color && crate::ui::should_use_color());
}

fn level(verbose: bool, quiet: bool) -> LogLevel {
    LogLevel::from_flags(verbose, quiet)
}
