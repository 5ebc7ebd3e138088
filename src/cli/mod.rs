//! Command-line interface for specforge
//!
//! - `args`: clap argument definitions
//! - `run`: entry point and command dispatch
//! - `commands`: command implementations
//! - `progress`: console rendering of run progress events

pub mod args;
mod commands;
mod progress;
mod run;

pub use args::{Cli, Commands, GenerateArgs, VerifyArgs};
pub use commands::EXAMPLE_SPEC;
pub use progress::ConsoleSink;
pub use run::run;
