use crate::error::RunnerError;
use std::time::Duration;

use super::CommandSpec;

/// Output from a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>, timed_out: bool) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            timed_out,
        }
    }

    /// Get stdout as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// stdout followed by stderr, as one string.
    #[must_use]
    pub fn combined(&self) -> String {
        let stdout = self.stdout_string();
        let stderr = self.stderr_string();
        if stderr.trim().is_empty() {
            stdout
        } else if stdout.trim().is_empty() {
            stderr
        } else {
            format!("{stdout}\n{stderr}")
        }
    }

    /// Check if the process exited successfully (exit code 0).
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// A long-lived child started with [`ProcessRunner::start`].
pub trait RunningProcess: Send {
    /// Exit code if the process has already exited.
    fn try_exit_code(&mut self) -> Result<Option<Option<i32>>, RunnerError>;

    /// Stop the process and collect whatever it wrote.
    fn terminate(self: Box<Self>) -> ProcessOutput;
}

/// Trait for process execution.
///
/// # Security
///
/// Implementations MUST use argv-style APIs only and never evaluate shell
/// strings.
///
/// # Threading
///
/// `ProcessRunner` is synchronous. Async callers move work onto a blocking
/// thread. Implementations are `Send + Sync` so one runner can be shared by
/// every check of a verification battery.
pub trait ProcessRunner: Send + Sync {
    /// Execute a command and wait for it, up to `timeout`.
    ///
    /// * `Ok(ProcessOutput)` - The process completed (possibly with non-zero exit code)
    /// * `Err(RunnerError::Timeout)` - The process was killed after `timeout`
    /// * `Err(RunnerError::*)` - Spawn or wait failures
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError>;

    /// Start a command without waiting for it.
    ///
    /// Runners that cannot manage background processes keep the default.
    fn start(&self, cmd: &CommandSpec) -> Result<Box<dyn RunningProcess>, RunnerError> {
        Err(RunnerError::Unsupported {
            reason: format!("cannot start '{}' in the background", cmd.display()),
        })
    }
}
