//! Invocation and result types shared by every backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::LlmError;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Input to a backend invocation
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    pub model: String,
    pub timeout: Duration,
    pub messages: Vec<Message>,
    /// Provider knobs (`max_tokens`, `temperature`)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(model: impl Into<String>, timeout: Duration, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            timeout,
            messages,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenated system messages.
    #[must_use]
    pub fn system_text(&self) -> String {
        self.text_for(Role::System)
    }

    /// Concatenated user messages.
    #[must_use]
    pub fn user_text(&self) -> String {
        self.text_for(Role::User)
    }

    fn text_for(&self, role: Role) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result of a backend invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    /// Provider name (e.g. "anthropic", "claude-cli", "pi")
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
    pub extensions: HashMap<String, serde_json::Value>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
            extensions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

/// A concrete way of turning messages into text.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;

    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Release long-lived resources such as subprocesses.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::system("be terse")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be terse"}"#);
    }

    #[test]
    fn test_invocation_text_helpers() {
        let inv = LlmInvocation::new(
            "gpt-4o",
            Duration::from_secs(5),
            vec![
                Message::system("sys a"),
                Message::user("hello"),
                Message::system("sys b"),
            ],
        )
        .with_metadata("max_tokens", serde_json::json!(100));

        assert_eq!(inv.system_text(), "sys a\n\nsys b");
        assert_eq!(inv.user_text(), "hello");
        assert_eq!(inv.metadata["max_tokens"], 100);
    }

    #[test]
    fn test_result_builders() {
        let result = LlmResult::new("ok", "anthropic", "claude-3")
            .with_tokens(10, 20)
            .with_extension("stop_reason", serde_json::json!("end_turn"));
        assert_eq!(result.tokens_output, Some(20));
        assert_eq!(result.extensions["stop_reason"], "end_turn");
    }
}
