pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod settings;
pub mod target;
pub mod validation;

// Re-export main types
pub use config::*;
pub use diagnostics::*;
pub use error::*;
pub use settings::*;
pub use target::*;

// Re-export discovery and validation
pub use discovery::{ConfigDiscovery, discover, discover_with_profile, load_file};
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema};
