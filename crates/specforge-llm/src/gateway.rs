//! The two-prompt interface the rest of the workflow talks to.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::HttpParams;
use crate::error::LlmError;
use crate::types::{LlmBackend, LlmInvocation, Message};

/// Send a system prompt and a user prompt, get text back.
///
/// Implementations must be shareable across tasks; one gateway serves a whole
/// run.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Provider/model label for logs and reports.
    fn describe(&self) -> String {
        "provider".to_string()
    }

    async fn shutdown(&self) {}
}

/// Gateway over a concrete [`LlmBackend`] with fixed model and sampling knobs.
pub struct BackendGateway {
    backend: Box<dyn LlmBackend>,
    model: String,
    timeout: Duration,
    params: HttpParams,
    calls: AtomicU32,
}

impl BackendGateway {
    #[must_use]
    pub fn new(
        backend: Box<dyn LlmBackend>,
        model: impl Into<String>,
        timeout: Duration,
        params: HttpParams,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
            params,
            calls: AtomicU32::new(0),
        }
    }

    /// Calls issued so far, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderGateway for BackendGateway {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let inv = LlmInvocation::new(
            self.model.clone(),
            self.timeout,
            vec![Message::system(system), Message::user(user)],
        )
        .with_metadata("max_tokens", serde_json::json!(self.params.max_tokens))
        .with_metadata("temperature", serde_json::json!(self.params.temperature));

        debug!(
            provider = self.backend.name(),
            call,
            system_chars = system.len(),
            user_chars = user.len(),
            "Provider call"
        );

        // Backends enforce their own request deadlines; this bounds everything else.
        let result = tokio::time::timeout(self.timeout, self.backend.invoke(inv))
            .await
            .map_err(|_| LlmError::Timeout {
                duration: self.timeout,
            })??;

        if result.raw_response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        info!(
            provider = %result.provider,
            model = %result.model_used,
            call,
            chars = result.raw_response.len(),
            tokens_output = ?result.tokens_output,
            "Provider call completed"
        );
        Ok(result.raw_response)
    }

    fn describe(&self) -> String {
        if self.model.is_empty() {
            self.backend.name().to_string()
        } else {
            format!("{}/{}", self.backend.name(), self.model)
        }
    }

    async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

type Responder = Box<dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync>;

/// Gateway answering from a script instead of a provider.
///
/// Used for offline runs and tests. Every prompt pair is recorded.
pub struct ScriptedGateway {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    /// Answer with `responses` in order; further calls fail.
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            queue: Mutex::new(responses.into_iter().collect()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call by running `f` on the prompts.
    #[must_use]
    pub fn from_fn(
        f: impl Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// `(system, user)` pairs received so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((system.to_string(), user.to_string()));
        }

        if let Some(responder) = &self.responder {
            return responder(system, user);
        }

        self.queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(LlmError::Unsupported("script exhausted".to_string())))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LlmResult;

    struct EchoBackend {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            assert_eq!(inv.metadata["max_tokens"], 64);
            Ok(LlmResult::new(
                format!("{}{}", self.reply, inv.user_text()),
                "echo",
                inv.model,
            ))
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LlmResult::new("late", "slow", "m"))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn params() -> HttpParams {
        HttpParams {
            max_tokens: 64,
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn test_backend_gateway_builds_messages() {
        let gateway = BackendGateway::new(
            Box::new(EchoBackend { reply: "re: " }),
            "m1",
            Duration::from_secs(5),
            params(),
        );
        assert_eq!(gateway.complete("sys", "hello").await.unwrap(), "re: hello");
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(gateway.describe(), "echo/m1");
    }

    #[tokio::test]
    async fn test_backend_gateway_rejects_whitespace() {
        let gateway = BackendGateway::new(
            Box::new(EchoBackend { reply: "   " }),
            "m1",
            Duration::from_secs(5),
            params(),
        );
        assert!(matches!(
            gateway.complete("sys", "").await,
            Err(LlmError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_backend_gateway_enforces_timeout() {
        let gateway = BackendGateway::new(
            Box::new(SlowBackend),
            "m",
            Duration::from_millis(50),
            params(),
        );
        assert!(matches!(
            gateway.complete("s", "u").await,
            Err(LlmError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_scripted_gateway_queue_and_recording() {
        let gateway = ScriptedGateway::new([Ok("one".to_string()), Err(LlmError::EmptyResponse)]);
        assert_eq!(gateway.complete("s", "u1").await.unwrap(), "one");
        assert!(gateway.complete("s", "u2").await.is_err());
        assert!(matches!(
            gateway.complete("s", "u3").await,
            Err(LlmError::Unsupported(_))
        ));
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(gateway.prompts()[1].1, "u2");
    }

    #[tokio::test]
    async fn test_scripted_gateway_from_fn() {
        let gateway = ScriptedGateway::from_fn(|system, _| Ok(format!("len={}", system.len())));
        assert_eq!(gateway.complete("abc", "").await.unwrap(), "len=3");
    }
}
