//! Backend driving `pi --mode rpc` over newline-delimited JSON.
//!
//! The subprocess is started on first use and kept for the rest of the run.
//! Each prompt is one `{"type":"prompt"}` command; the answer is assembled
//! from `text_delta` events until `agent_end`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Separator between the system and user prompt in the single RPC message.
pub(crate) const PROMPT_SEPARATOR: &str = "\n\n---\n\n";

struct PiSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

pub(crate) struct PiRpcBackend {
    binary_path: PathBuf,
    session: Mutex<Option<PiSession>>,
}

/// What one stdout line means for the pending prompt.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    Done,
    Failed(String),
}

impl PiRpcBackend {
    pub fn new(binary_path: Option<PathBuf>) -> Result<Self, LlmError> {
        let binary_path = match binary_path {
            Some(path) => path,
            None => which::which("pi").map_err(|e| {
                LlmError::Misconfiguration(format!(
                    "Pi not found in PATH. Install it with `npm i -g @mariozechner/pi-coding-agent` \
                     and run `pi` once to authenticate. Error: {e}"
                ))
            })?,
        };
        Ok(Self {
            binary_path,
            session: Mutex::new(None),
        })
    }

    fn spawn(&self) -> Result<PiSession, LlmError> {
        info!(binary = %self.binary_path.display(), "Starting Pi RPC");

        let mut child = Command::new(&self.binary_path)
            .args(["--mode", "rpc", "--no-session"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LlmError::Misconfiguration(format!(
                    "Failed to start {}: {e}",
                    self.binary_path.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LlmError::Process("Pi stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LlmError::Process("Pi stdout was not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "specforge::pi", "{line}");
                }
            });
        }

        Ok(PiSession {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }

    async fn prompt(
        session: &mut PiSession,
        message: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let command = serde_json::json!({ "type": "prompt", "message": message });
        let mut payload = command.to_string();
        payload.push('\n');
        session
            .stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| LlmError::Process(format!("Failed to write to Pi: {e}")))?;
        session
            .stdin
            .flush()
            .await
            .map_err(|e| LlmError::Process(format!("Failed to flush Pi stdin: {e}")))?;

        let deadline = Instant::now() + timeout;
        let mut text = String::new();

        loop {
            let next = tokio::time::timeout_at(deadline, session.lines.next_line())
                .await
                .map_err(|_| LlmError::Timeout { duration: timeout })?;

            match next {
                Ok(Some(line)) => match handle_line(&line, &mut text) {
                    LineOutcome::Continue => {}
                    LineOutcome::Done => return Ok(text),
                    LineOutcome::Failed(error) => {
                        return Err(LlmError::Process(format!("Pi RPC error: {error}")));
                    }
                },
                Ok(None) => {
                    let code = session.child.try_wait().ok().flatten().and_then(|s| s.code());
                    return Err(LlmError::Process(format!(
                        "Pi process exited with code {code:?}"
                    )));
                }
                Err(e) => {
                    return Err(LlmError::Process(format!("Failed to read from Pi: {e}")));
                }
            }
        }
    }

    async fn stop_session(mut session: PiSession) {
        drop(session.stdin);
        if let Err(e) = session.child.start_kill() {
            debug!(error = %e, "Pi already exited");
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, session.child.wait()).await {
            Ok(_) => info!("Pi RPC stopped"),
            Err(_) => warn!("Pi did not exit within {}s", SHUTDOWN_GRACE.as_secs()),
        }
    }
}

/// Fold one line of Pi output into the pending answer.
///
/// Non-JSON lines and unknown event types are ignored.
fn handle_line(line: &str, text: &mut String) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Continue;
    }
    let Ok(event) = serde_json::from_str::<Value>(line) else {
        return LineOutcome::Continue;
    };

    match event.get("type").and_then(Value::as_str) {
        Some("message_update") => {
            let delta = &event["assistantMessageEvent"];
            if delta.get("type").and_then(Value::as_str) == Some("text_delta")
                && let Some(chunk) = delta.get("delta").and_then(Value::as_str)
            {
                text.push_str(chunk);
            }
            LineOutcome::Continue
        }
        Some("agent_end") => LineOutcome::Done,
        Some("response") if event.get("success").and_then(Value::as_bool) == Some(false) => {
            let error = event
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            LineOutcome::Failed(error.to_string())
        }
        _ => LineOutcome::Continue,
    }
}

#[async_trait]
impl LlmBackend for PiRpcBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let message = format!("{}{PROMPT_SEPARATOR}{}", inv.system_text(), inv.user_text());

        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(LlmError::Process("Pi session unavailable".to_string()));
        };

        debug!(provider = "pi", chars = message.len(), "Sending Pi prompt");
        let outcome = Self::prompt(session, &message, inv.timeout).await;

        // A session that failed mid-prompt is in an unknown state; restart next time.
        if outcome.is_err()
            && let Some(session) = guard.take()
        {
            Self::stop_session(session).await;
        }

        let text = outcome?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(LlmResult::new(text, "pi", "pi"))
    }

    fn name(&self) -> &'static str {
        "pi"
    }

    async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            Self::stop_session(session).await;
        }
    }
}
