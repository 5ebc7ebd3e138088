//! Per-run configuration for specforge.
//!
//! A [`RunConfig`] is built once per run (from CLI arguments, an optional
//! `.specforge/config.toml` and built-in defaults) and then passed by reference
//! to every component. Nothing reads process-wide mutable state after that,
//! so concurrent runs in one process cannot observe each other's settings.

mod builder;
mod discovery;
mod model;
mod validation;

pub use builder::RunConfigBuilder;
pub use discovery::{CliArgs, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use model::{
    CheckKind, ChecksConfig, ConfigSource, DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL, ProviderKind,
    RunConfig, TargetProfile, Timeouts,
};
