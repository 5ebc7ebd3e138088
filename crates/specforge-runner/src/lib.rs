//! Process execution for dependency installs, test runs, smoke tests,
//! container builds and subprocess-backed providers.
//!
//! # Security Model
//!
//! All process execution goes through [`CommandSpec`] to ensure argv-style invocation.
//! Arguments are passed as discrete elements, never as shell strings.

pub mod command_spec;
pub mod error;
pub mod native;
pub mod process;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use native::{NativeProcess, NativeRunner};
pub use process::{ProcessOutput, ProcessRunner, RunningProcess};
