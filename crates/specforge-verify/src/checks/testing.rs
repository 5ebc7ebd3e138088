//! Scripted process runner for check tests.

use std::sync::Mutex;

use specforge_runner::{CommandSpec, ProcessOutput, ProcessRunner, RunnerError, RunningProcess};
use std::time::Duration;

type Responder = Box<dyn Fn(&CommandSpec) -> Result<ProcessOutput, RunnerError> + Send + Sync>;
type Starter = Box<dyn Fn(&CommandSpec) -> Result<Box<dyn RunningProcess>, RunnerError> + Send + Sync>;

/// Answers every `run` with a closure and records the command lines.
pub(crate) struct ScriptedRunner {
    respond: Responder,
    start: Option<Starter>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(
        respond: impl Fn(&CommandSpec) -> Result<ProcessOutput, RunnerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            start: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_start(
        mut self,
        start: impl Fn(&CommandSpec) -> Result<Box<dyn RunningProcess>, RunnerError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.start = Some(Box::new(start));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, cmd: &CommandSpec, _timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        self.calls.lock().unwrap().push(cmd.display());
        (self.respond)(cmd)
    }

    fn start(&self, cmd: &CommandSpec) -> Result<Box<dyn RunningProcess>, RunnerError> {
        self.calls.lock().unwrap().push(cmd.display());
        match &self.start {
            Some(start) => start(cmd),
            None => Err(RunnerError::Unsupported {
                reason: "no background processes scripted".into(),
            }),
        }
    }
}

pub(crate) fn output(code: i32, stdout: &str) -> Result<ProcessOutput, RunnerError> {
    Ok(ProcessOutput::new(stdout.as_bytes().to_vec(), Vec::new(), Some(code), false))
}

/// Background process stub with a fixed exit state.
pub(crate) struct FakeProcess {
    pub exit: Option<Option<i32>>,
    pub stderr: String,
}

impl RunningProcess for FakeProcess {
    fn try_exit_code(&mut self) -> Result<Option<Option<i32>>, RunnerError> {
        Ok(self.exit)
    }

    fn terminate(self: Box<Self>) -> ProcessOutput {
        ProcessOutput::new(Vec::new(), self.stderr.into_bytes(), self.exit.flatten(), false)
    }
}

/// Value following `--port` in a command line.
pub(crate) fn port_arg(cmd: &CommandSpec) -> Option<u16> {
    let args: Vec<String> = cmd
        .args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    args.iter()
        .position(|a| a == "--port")
        .and_then(|i| args.get(i + 1))
        .and_then(|p| p.parse().ok())
}

pub(crate) fn running(
    exit: Option<Option<i32>>,
    stderr: &str,
) -> Result<Box<dyn RunningProcess>, RunnerError> {
    Ok(Box::new(FakeProcess {
        exit,
        stderr: stderr.to_string(),
    }))
}
