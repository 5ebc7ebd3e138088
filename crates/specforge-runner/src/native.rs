use std::io::{Read, Write};
use std::process::{Child, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RunnerError;
use crate::process::{ProcessOutput, ProcessRunner, RunningProcess};
use crate::CommandSpec;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Runs commands directly on the host.
///
/// On Unix every child is placed in its own process group so that timeouts
/// and termination also reach grandchildren (pip workers, uvicorn reloaders,
/// docker clients).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRunner;

impl NativeRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn spawn_child(cmd: &CommandSpec) -> Result<(Child, Pipes), RunnerError> {
        let mut command = cmd.to_command();
        command
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: cmd.program.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        if let (Some(input), Some(mut stdin)) = (cmd.stdin.clone(), child.stdin.take()) {
            // Dropping stdin at the end of the thread closes the pipe.
            thread::spawn(move || {
                let _ = stdin.write_all(&input);
            });
        }

        let pipes = Pipes {
            stdout: child.stdout.take().map(spawn_reader),
            stderr: child.stderr.take().map(spawn_reader),
        };

        Ok((child, pipes))
    }
}

impl ProcessRunner for NativeRunner {
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        let (mut child, pipes) = Self::spawn_child(cmd)?;
        let deadline = Instant::now() + timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    kill_group(&child);
                    let (stdout, stderr) = pipes.collect();
                    return Ok(ProcessOutput::new(stdout, stderr, status.code(), false));
                }
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    return Err(RunnerError::NativeExecutionFailed {
                        reason: format!("Failed to wait for process: {e}"),
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                terminate(&mut child);
                let _ = pipes.collect();
                debug!(command = %cmd.display(), timeout_secs = timeout.as_secs(), "Process timed out");
                return Err(RunnerError::Timeout {
                    timeout_seconds: timeout.as_secs(),
                });
            }

            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn start(&self, cmd: &CommandSpec) -> Result<Box<dyn RunningProcess>, RunnerError> {
        let (child, pipes) = Self::spawn_child(cmd)?;
        Ok(Box::new(NativeProcess { child, pipes }))
    }
}

/// Background child started by [`NativeRunner::start`].
pub struct NativeProcess {
    child: Child,
    pipes: Pipes,
}

impl RunningProcess for NativeProcess {
    fn try_exit_code(&mut self) -> Result<Option<Option<i32>>, RunnerError> {
        self.child
            .try_wait()
            .map(|status| status.map(|s| s.code()))
            .map_err(|e| RunnerError::NativeExecutionFailed {
                reason: format!("Failed to poll process: {e}"),
            })
    }

    fn terminate(self: Box<Self>) -> ProcessOutput {
        let NativeProcess { mut child, pipes } = *self;
        let exit_code = match child.try_wait() {
            Ok(Some(status)) => {
                kill_group(&child);
                status.code()
            }
            _ => {
                terminate(&mut child);
                None
            }
        };
        let (stdout, stderr) = pipes.collect();
        ProcessOutput::new(stdout, stderr, exit_code, false)
    }
}

struct Pipes {
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl Pipes {
    fn collect(self) -> (Vec<u8>, Vec<u8>) {
        (join_reader(self.stdout), join_reader(self.stderr))
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// SIGTERM the group, wait briefly, then SIGKILL whatever is left.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(child.id() as i32);
        let _ = killpg(pgid, Signal::SIGTERM);

        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    let _ = child.kill();
    let _ = child.wait();
}

/// Reap leftovers in the group of an already exited child.
fn kill_group(child: &Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    {
        let _ = child;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_native_runner_echo_command() {
        let runner = NativeRunner::new();
        let output = runner
            .run(&CommandSpec::new("echo").arg("hello world"), Duration::from_secs(10))
            .unwrap();
        assert!(output.success());
        assert!(output.stdout_string().contains("hello world"));
    }

    #[test]
    fn test_shell_metacharacters_not_interpreted() {
        let output = NativeRunner::new()
            .run(&CommandSpec::new("echo").arg("$PATH"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(output.stdout_string().trim(), "$PATH");
    }

    #[test]
    fn test_nonzero_exit_is_output_not_error() {
        let output = NativeRunner::new()
            .run(&CommandSpec::new("false"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(output.exit_code, Some(1));
        assert!(!output.success());
    }

    #[test]
    fn test_nonexistent_command() {
        let cmd = CommandSpec::new("this_command_definitely_does_not_exist_12345");
        match NativeRunner::new().run(&cmd, Duration::from_secs(10)) {
            Err(RunnerError::SpawnFailed { program, .. }) => {
                assert_eq!(program, "this_command_definitely_does_not_exist_12345");
            }
            other => panic!("expected SpawnFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_kills_process() {
        let started = Instant::now();
        let result = NativeRunner::new().run(
            &CommandSpec::new("sleep").arg("30"),
            Duration::from_millis(300),
        );
        assert!(matches!(result, Err(RunnerError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_stdin_is_delivered() {
        let output = NativeRunner::new()
            .run(
                &CommandSpec::new("cat").stdin("prompt text"),
                Duration::from_secs(10),
            )
            .unwrap();
        assert_eq!(output.stdout_string(), "prompt text");
    }

    #[test]
    fn test_cwd_and_env() {
        let dir = std::env::temp_dir();
        let output = NativeRunner::new()
            .run(
                &CommandSpec::new("sh")
                    .args(["-c", "printf '%s' \"$SPECFORGE_TEST_VAR\""])
                    .cwd(&dir)
                    .env("SPECFORGE_TEST_VAR", "value"),
                Duration::from_secs(10),
            )
            .unwrap();
        assert_eq!(output.stdout_string(), "value");
    }

    #[test]
    fn test_background_process_terminate() {
        let runner = NativeRunner::new();
        let mut process = runner
            .start(&CommandSpec::new("sleep").arg("30"))
            .unwrap();
        assert_eq!(process.try_exit_code().unwrap(), None);

        let started = Instant::now();
        let output = process.terminate();
        assert!(!output.success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_background_process_observes_exit() {
        let runner = NativeRunner::new();
        let mut process = runner.start(&CommandSpec::new("true")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut code = None;
        while Instant::now() < deadline {
            if let Some(c) = process.try_exit_code().unwrap() {
                code = Some(c);
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(code, Some(Some(0)));
        assert_eq!(process.terminate().exit_code, Some(0));
    }
}
