//! Chat-completions backend shared by OpenAI and the providers that speak
//! the same wire format (OpenRouter, Moonshot, DeepSeek).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::LlmError;
use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};
use crate::HttpParams;

const OPENROUTER_REFERER: &str = "https://github.com/specforge/specforge";
const OPENROUTER_TITLE: &str = "specforge";

/// Which service a [`ChatCompletionsBackend`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    OpenAi,
    OpenRouter,
    Moonshot,
    DeepSeek,
}

impl Flavor {
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Moonshot => "moonshot",
            Self::DeepSeek => "deepseek",
        }
    }

    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Moonshot => "https://api.moonshot.ai/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
        }
    }
}

#[derive(Clone)]
pub(crate) struct ChatCompletionsBackend {
    client: Arc<HttpClient>,
    flavor: Flavor,
    endpoint: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl ChatCompletionsBackend {
    /// `base_url` is the API root (".../v1"); the endpoint path is appended.
    pub fn new(
        flavor: Flavor,
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        let base = base_url.unwrap_or_else(|| flavor.default_base_url().to_string());
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            flavor,
            endpoint: chat_endpoint(&base),
            api_key,
            default_model,
            default_params,
        })
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: msg.content.clone(),
            })
            .collect()
    }
}

fn chat_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmBackend for ChatCompletionsBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let provider = self.flavor.name();
        let (model, params) = self.default_params.resolve(&self.default_model, &inv);

        debug!(
            provider,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking chat completions backend"
        );

        let body = ChatRequest {
            model: model.clone(),
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if self.flavor == Flavor::OpenRouter {
            request = request
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }
        let request = request.json(&body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, provider)
            .await?;

        let response_body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse {provider} response: {e}")))?;

        let choice = response_body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Transport(format!("{provider} response missing choices[0]")))?;

        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let mut result = LlmResult::new(content, provider, model);
        if let Some(usage) = response_body.usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }
        if let Some(reason) = choice.finish_reason {
            result = result.with_extension("finish_reason", serde_json::Value::String(reason));
        }

        debug!(
            provider,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Chat completions invocation completed"
        );

        Ok(result)
    }

    fn name(&self) -> &'static str {
        self.flavor.name()
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
