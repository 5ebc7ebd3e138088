//! One-shot `claude -p` backend.
//!
//! Each invocation runs the Claude CLI in print mode with the prompt on stdin
//! and takes stdout as the completion.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use specforge_runner::{CommandSpec, ProcessRunner, RunnerError};

use crate::error::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

pub(crate) struct ClaudeCliBackend {
    binary_path: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    default_model: Option<String>,
}

impl ClaudeCliBackend {
    pub fn new(
        binary_path: Option<PathBuf>,
        runner: Arc<dyn ProcessRunner>,
        default_model: Option<String>,
    ) -> Result<Self, LlmError> {
        let binary_path = match binary_path {
            Some(path) => path,
            None => Self::discover_binary()?,
        };
        Ok(Self {
            binary_path,
            runner,
            default_model,
        })
    }

    fn discover_binary() -> Result<PathBuf, LlmError> {
        which::which("claude").map_err(|e| {
            LlmError::Misconfiguration(format!(
                "Claude CLI binary not found in PATH. Install it or pick another provider. Error: {e}"
            ))
        })
    }

    fn messages_to_prompt(messages: &[Message]) -> String {
        let mut prompt = String::new();
        for msg in messages {
            let label = match msg.role {
                Role::System => "System: ",
                Role::User => "User: ",
                Role::Assistant => "Assistant: ",
            };
            prompt.push_str(label);
            prompt.push_str(&msg.content);
            prompt.push_str("\n\n");
        }
        prompt
    }

    fn build_command(&self, inv: &LlmInvocation) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.binary_path)
            .arg("-p")
            .args(["--output-format", "text"]);

        let model = Some(inv.model.as_str())
            .filter(|m| !m.is_empty())
            .or(self.default_model.as_deref());
        if let Some(model) = model {
            cmd = cmd.args(["--model", model]);
        }

        cmd.stdin(Self::messages_to_prompt(&inv.messages))
    }
}

#[async_trait]
impl LlmBackend for ClaudeCliBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let cmd = self.build_command(&inv);
        let timeout = inv.timeout;
        let runner = Arc::clone(&self.runner);

        debug!(
            provider = "claude-cli",
            command = %cmd.display(),
            timeout_secs = timeout.as_secs(),
            "Invoking Claude CLI"
        );

        let output = tokio::task::spawn_blocking(move || runner.run(&cmd, timeout))
            .await
            .map_err(|e| LlmError::Process(format!("Claude CLI task failed: {e}")))?
            .map_err(|e| match e {
                RunnerError::Timeout { .. } => LlmError::Timeout { duration: timeout },
                RunnerError::SpawnFailed { .. } => LlmError::Misconfiguration(e.to_string()),
                other => LlmError::Process(other.to_string()),
            })?;

        if !output.success() {
            let stderr = output.stderr_string();
            return Err(LlmError::Process(format!(
                "claude exited with {:?}: {}",
                output.exit_code,
                stderr.trim()
            )));
        }

        let text = output.stdout_string();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let model_used = Some(inv.model)
            .filter(|m| !m.is_empty())
            .or_else(|| self.default_model.clone())
            .unwrap_or_else(|| "default".to_string());
        Ok(LlmResult::new(text, "claude-cli", model_used))
    }

    fn name(&self) -> &'static str {
        "claude-cli"
    }
}
