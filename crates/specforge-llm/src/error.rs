use std::time::Duration;

use specforge_utils::{ErrorCategory, UserFriendlyError};

/// Errors that can occur while producing a completion.
///
/// The workflow never sees these directly: the generation coordinator and the
/// design extractor wrap them as the cause of their own failures.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (process spawn, HTTP connectivity, bad payload)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// The provider answered with nothing but whitespace
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// A subprocess provider exited or reported an error
    #[error("Provider process failed: {0}")]
    Process(String),

    /// Per-run call budget exhausted
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// Configuration error (missing key, missing binary)
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Whether a later attempt with the same inputs could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ProviderOutage(_)
                | Self::ProviderQuota(_)
                | Self::Timeout { .. }
                | Self::EmptyResponse
                | Self::Process(_)
        )
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Provider transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("Provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("Provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("Provider call timed out after {}s", duration.as_secs())
            }
            Self::EmptyResponse => "Provider returned an empty response".to_string(),
            Self::Process(msg) => format!("Provider process failed: {msg}"),
            Self::BudgetExceeded { limit, attempted } => format!(
                "Provider call budget exhausted ({attempted} attempted, limit {limit})"
            ),
            Self::Misconfiguration(msg) => format!("Provider is misconfigured: {msg}"),
            Self::Unsupported(msg) => format!("Unsupported provider setting: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProviderAuth(_) => {
                Some("The API key was rejected by the provider.".to_string())
            }
            Self::BudgetExceeded { .. } => {
                Some("run.max_provider_calls caps provider calls for a whole run.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => vec![
                "Check the API key environment variable for the selected provider".to_string(),
                "Use --api-key-env to read the key from another variable".to_string(),
            ],
            Self::ProviderQuota(_) => vec!["Wait and retry, or switch model/provider".to_string()],
            Self::Timeout { .. } => {
                vec!["Raise timeouts.provider_call_secs in .specforge/config.toml".to_string()]
            }
            Self::BudgetExceeded { .. } => {
                vec!["Raise or remove run.max_provider_calls".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Provider,
        }
    }
}
