//! Command-line interface for the Manifold multi-target bundler.
//!
//! - [`cli`] - clap argument definitions
//! - [`config`] - locating the project, invocation options, config conversion
//! - `commands` - `build` and `check`
//! - [`writer`] - writes bundles, assets and `asset-manifest.json`
//! - [`ui`] - status messages and the rendered build report
//! - [`logger`] - tracing subscriber setup
//! - [`error`] - `CliError` and its `miette` conversion

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod ui;
pub mod writer;

pub use error::{CliError, Result};
