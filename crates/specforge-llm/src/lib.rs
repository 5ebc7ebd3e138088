//! Text-completion providers for specforge.
//!
//! Every provider implements [`LlmBackend`]; the workflow only ever sees the
//! two-prompt [`ProviderGateway`] built on top of one.

mod anthropic;
mod budgeted;
mod claude_cli;
mod error;
mod gateway;
pub(crate) mod http_client;
mod openai_compat;
mod pi_rpc;
mod types;

use std::sync::Arc;

use specforge_config::{ConfigSource, ProviderKind, RunConfig};
use specforge_runner::{NativeRunner, ProcessRunner};

pub use budgeted::BudgetedBackend;
pub use error::LlmError;
pub use gateway::{BackendGateway, ProviderGateway, ScriptedGateway};
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

use anthropic::AnthropicBackend;
use claude_cli::ClaudeCliBackend;
use openai_compat::{ChatCompletionsBackend, Flavor};
use pi_rpc::PiRpcBackend;

/// Sampling parameters sent with every HTTP request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 16_384,
            temperature: 0.1,
        }
    }
}

impl HttpParams {
    /// Resolve model and parameters for one invocation.
    ///
    /// A non-empty `inv.model` wins over `default_model`; `max_tokens` and
    /// `temperature` metadata win over these defaults.
    pub(crate) fn resolve(&self, default_model: &str, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            default_model.to_string()
        } else {
            inv.model.clone()
        };

        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.max_tokens);

        #[allow(clippy::cast_possible_truncation)]
        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(self.temperature);

        (
            model,
            HttpParams {
                max_tokens,
                temperature,
            },
        )
    }
}

/// Key prefixes copied from setup guides rather than real credentials.
const PLACEHOLDER_KEY_PREFIXES: &[&str] = &["sk-ant-your", "sk-your"];

/// Find the credential for an HTTP provider.
///
/// Precedence: explicit key in the config, then the configured environment
/// variable override, then the provider's standard variable.
fn resolve_api_key(config: &RunConfig, provider: ProviderKind) -> Result<String, LlmError> {
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    let var = config
        .api_key_env
        .as_deref()
        .or_else(|| provider.api_key_env())
        .ok_or_else(|| {
            LlmError::Unsupported(format!("Provider '{provider}' does not take an API key"))
        })?;

    match std::env::var(var) {
        Ok(key) if is_placeholder_key(&key) => Err(LlmError::Misconfiguration(format!(
            "{var} contains a placeholder value; set a real {provider} API key"
        ))),
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(LlmError::Misconfiguration(format!(
            "{provider} API key not found in environment variable '{var}'"
        ))),
    }
}

fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    PLACEHOLDER_KEY_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn base_url_for(config: &RunConfig, provider: ProviderKind) -> Option<String> {
    config.base_url.clone().or_else(|| {
        (provider == ProviderKind::OpenAi)
            .then(|| std::env::var("OPENAI_API_BASE").ok())
            .flatten()
            .filter(|url| !url.trim().is_empty())
    })
}

/// Construct the backend for the config's (resolved) provider.
///
/// `runner` executes one-shot subprocess providers. The backend is wrapped in a
/// [`BudgetedBackend`] when `max_provider_calls` is set.
///
/// # Errors
///
/// `Misconfiguration` for missing credentials or binaries, `Unsupported` for
/// providers that cannot be built.
pub fn from_run_config(
    config: &RunConfig,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Box<dyn LlmBackend>, LlmError> {
    let provider = config.resolved_provider();
    let params = HttpParams {
        max_tokens: config.max_tokens,
        temperature: config.effective_temperature(),
    };

    let backend: Box<dyn LlmBackend> = match provider {
        ProviderKind::Anthropic => Box::new(AnthropicBackend::new(
            resolve_api_key(config, provider)?,
            base_url_for(config, provider),
            config.model.clone(),
            params,
        )?),
        ProviderKind::OpenAi
        | ProviderKind::OpenRouter
        | ProviderKind::Moonshot
        | ProviderKind::DeepSeek => {
            let flavor = match provider {
                ProviderKind::OpenRouter => Flavor::OpenRouter,
                ProviderKind::Moonshot => Flavor::Moonshot,
                ProviderKind::DeepSeek => Flavor::DeepSeek,
                _ => Flavor::OpenAi,
            };
            Box::new(ChatCompletionsBackend::new(
                flavor,
                resolve_api_key(config, provider)?,
                base_url_for(config, provider),
                config.model.clone(),
                params,
            )?)
        }
        ProviderKind::ClaudeCli => Box::new(ClaudeCliBackend::new(
            None,
            runner,
            subprocess_model(config),
        )?),
        ProviderKind::Pi => Box::new(PiRpcBackend::new(None)?),
        ProviderKind::Api => {
            return Err(LlmError::Unsupported(format!(
                "Provider 'api' did not resolve for model '{}'. Supported providers: {}",
                config.model,
                ProviderKind::supported()
            )));
        }
    };

    Ok(match config.max_provider_calls {
        Some(limit) => Box::new(BudgetedBackend::new(backend, limit)),
        None => backend,
    })
}

/// The model a subprocess provider should be asked for.
///
/// Subprocess providers pick their own model unless the user named one.
fn subprocess_model(config: &RunConfig) -> Option<String> {
    (config.source_of("model") != ConfigSource::Default).then(|| config.model.clone())
}

/// Build the run's gateway from configuration.
///
/// # Errors
///
/// See [`from_run_config`].
pub fn gateway_from_run_config(config: &RunConfig) -> Result<BackendGateway, LlmError> {
    let provider = config.resolved_provider();
    let backend = from_run_config(config, Arc::new(NativeRunner::new()))?;
    let model = if provider.is_subprocess() {
        subprocess_model(config).unwrap_or_default()
    } else {
        config.model.clone()
    };
    Ok(BackendGateway::new(
        backend,
        model,
        config.timeouts.provider_call,
        HttpParams {
            max_tokens: config.max_tokens,
            temperature: config.effective_temperature(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    fn config_for(model: &str) -> RunConfig {
        RunConfig::builder().model(model).build().unwrap()
    }

    #[test]
    fn test_http_params_resolution() {
        let defaults = HttpParams::default();
        let inv = LlmInvocation::new("", Duration::from_secs(1), vec![])
            .with_metadata("temperature", serde_json::json!(0.7));
        let (model, params) = defaults.resolve("fallback", &inv);
        assert_eq!(model, "fallback");
        assert_eq!(params.max_tokens, 16_384);
        assert!((params.temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    #[serial]
    fn test_explicit_api_key_wins() {
        let config = RunConfig::builder()
            .model("gpt-4o")
            .api_key("sk-explicit")
            .build()
            .unwrap();
        assert_eq!(
            resolve_api_key(&config, ProviderKind::OpenAi).unwrap(),
            "sk-explicit"
        );
    }

    #[test]
    #[serial]
    fn test_missing_key_is_misconfiguration() {
        let config = RunConfig {
            api_key_env: Some("SPECFORGE_TEST_UNSET_KEY".to_string()),
            ..config_for("gpt-4o")
        };
        // SAFETY: serialized with other env tests
        unsafe { std::env::remove_var("SPECFORGE_TEST_UNSET_KEY") };
        match from_run_config(&config, Arc::new(NativeRunner::new())) {
            Err(LlmError::Misconfiguration(msg)) => {
                assert!(msg.contains("SPECFORGE_TEST_UNSET_KEY"));
            }
            Err(other) => panic!("Expected Misconfiguration, got {other:?}"),
            Ok(_) => panic!("Expected Misconfiguration, got a backend"),
        }
    }

    #[test]
    #[serial]
    fn test_placeholder_key_rejected() {
        let config = RunConfig {
            api_key_env: Some("SPECFORGE_TEST_PLACEHOLDER".to_string()),
            ..config_for("claude-sonnet-4-20250514")
        };
        // SAFETY: serialized with other env tests
        unsafe { std::env::set_var("SPECFORGE_TEST_PLACEHOLDER", "sk-ant-your-key-here") };
        let err = resolve_api_key(&config, ProviderKind::Anthropic).unwrap_err();
        assert!(err.to_string().contains("placeholder"));
        unsafe { std::env::remove_var("SPECFORGE_TEST_PLACEHOLDER") };
    }

    #[test]
    #[serial]
    fn test_budget_wrapping_and_provider_names() {
        let config = RunConfig {
            api_key: Some("sk-test".to_string()),
            max_provider_calls: Some(5),
            ..config_for("deepseek-chat")
        };
        let backend = from_run_config(&config, Arc::new(NativeRunner::new())).unwrap();
        assert_eq!(backend.name(), "deepseek");

        let gateway = gateway_from_run_config(&config).unwrap();
        assert_eq!(gateway.describe(), "deepseek/deepseek-chat");
    }

    #[test]
    fn test_subprocess_model_only_when_chosen() {
        let defaulted = RunConfig::default();
        assert_eq!(subprocess_model(&defaulted), None);
        let chosen = config_for("opus");
        assert_eq!(subprocess_model(&chosen).as_deref(), Some("opus"));
    }
}
