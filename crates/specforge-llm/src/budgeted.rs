//! Call-count budget around any backend.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Caps the number of invocations for the lifetime of one run.
///
/// Attempts are counted, not successes: a failed call still consumes its
/// slot, so repair loops cannot spend past the limit.
pub struct BudgetedBackend {
    inner: Box<dyn LlmBackend>,
    used: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    #[must_use]
    pub fn new(inner: Box<dyn LlmBackend>, limit: u32) -> Self {
        debug!(limit, provider = inner.name(), "Creating BudgetedBackend");
        Self {
            inner,
            used: AtomicU32::new(0),
            limit,
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let current = self.used.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(limit = self.limit, attempted, "Provider call budget exceeded");
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        let result = self.inner.invoke(inv).await;
        if let Err(e) = &result {
            debug!(
                call_count = current + 1,
                limit = self.limit,
                error = %e,
                "Inner backend failed (budget slot still consumed)"
            );
        }
        result
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::time::Duration;

    struct MockSuccessBackend;

    #[async_trait]
    impl LlmBackend for MockSuccessBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Ok(LlmResult::new("test response", "mock", "mock-model"))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    struct MockFailureBackend;

    #[async_trait]
    impl LlmBackend for MockFailureBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Err(LlmError::Transport("mock failure".to_string()))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn invocation() -> LlmInvocation {
        LlmInvocation::new(
            "test-model",
            Duration::from_secs(60),
            vec![Message::user("test message")],
        )
    }

    #[tokio::test]
    async fn test_budget_allows_calls_under_limit_then_rejects() {
        let backend = BudgetedBackend::new(Box::new(MockSuccessBackend), 2);

        assert!(backend.invoke(invocation()).await.is_ok());
        assert!(backend.invoke(invocation()).await.is_ok());

        match backend.invoke(invocation()).await {
            Err(LlmError::BudgetExceeded { limit, attempted }) => {
                assert_eq!(limit, 2);
                assert_eq!(attempted, 3);
            }
            other => panic!("Expected BudgetExceeded, got {other:?}"),
        }
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_calls_consume_budget() {
        let backend = BudgetedBackend::new(Box::new(MockFailureBackend), 1);

        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::Transport(_))
        ));
        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::BudgetExceeded { .. })
        ));
        assert_eq!(backend.limit(), 1);
        assert_eq!(backend.name(), "mock");
    }
}
