/// LLM Client — the single point of entry for all provider API calls.
///
/// ARCHITECTURAL RULE: No other module may call a provider HTTP API directly.
/// Generators talk to the `LlmProvider` trait; `LlmClient` is the production
/// implementation and dispatches on the model's provider.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::billing::registry::{ModelDescriptor, ModelId, Provider};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No API key configured for provider {0:?}")]
    MissingApiKey(Provider),
}

/// One completion request. Generators always ask for a JSON object back.
#[derive(Debug, Clone, Copy)]
pub struct LlmRequest<'a> {
    pub model: &'a ModelDescriptor,
    pub system: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn call(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError>;
}

/// Calls the provider and deserializes the text response as JSON.
/// The prompt must instruct the model to return valid JSON.
pub async fn call_json<T: DeserializeOwned>(
    llm: &dyn LlmProvider,
    request: LlmRequest<'_>,
) -> Result<T, LlmError> {
    let response = llm.call(request).await?;
    if response.text.trim().is_empty() {
        return Err(LlmError::EmptyContent);
    }

    // Strip markdown code fences if the model wraps JSON in them
    let text = strip_json_fences(&response.text);

    serde_json::from_str(text).map_err(LlmError::Parse)
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The LLM client used by all generators.
/// Wraps the Anthropic Messages and OpenAI Chat Completions APIs with retry logic.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    anthropic_api_key: Option<String>,
    openai_api_key: Option<String>,
}

impl LlmClient {
    pub fn new(
        anthropic_api_key: Option<String>,
        openai_api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
            anthropic_api_key,
            openai_api_key,
        })
    }

    async fn call_anthropic(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError> {
        let api_key = self
            .anthropic_api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey(Provider::Anthropic))?;

        let body = AnthropicRequest {
            model: request.model.id.as_str(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
        };

        let response: AnthropicResponse = self
            .send_with_retry(|| {
                self.client
                    .post(ANTHROPIC_API_URL)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("content-type", "application/json")
                    .json(&body)
            })
            .await?;

        let text = response
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.clone())
            .ok_or(LlmError::EmptyContent)?;

        Ok(LlmResponse {
            text,
            usage: Usage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }

    async fn call_openai(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError> {
        let api_key = self
            .openai_api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey(Provider::OpenAi))?;

        // The high-reasoning variant is o4-mini with an effort hint; reasoning
        // models reject a temperature.
        let (model, temperature, reasoning_effort) = match request.model.id {
            ModelId::O4MiniHigh => ("o4-mini", None, Some("high")),
            other => (other.as_str(), Some(request.temperature), None),
        };

        let body = OpenAiRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
            max_completion_tokens: request.max_tokens,
            temperature,
            reasoning_effort,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response: OpenAiResponse = self
            .send_with_retry(|| {
                self.client
                    .post(OPENAI_API_URL)
                    .bearer_auth(api_key)
                    .json(&body)
            })
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyContent)?;
        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse { text, usage })
    }

    /// Sends the request built by `build`, retrying on 429 and 5xx with
    /// exponential backoff.
    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<T, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response.json().await?);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn call(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError> {
        let response = match request.model.provider {
            Provider::Anthropic => self.call_anthropic(request).await?,
            Provider::OpenAi => self.call_openai(request).await?,
        };

        debug!(
            "LLM call to {} succeeded: input_tokens={}, output_tokens={}",
            request.model.id, response.usage.input_tokens, response.usage.output_tokens
        );
        Ok(response)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(stripped) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    stripped
        .trim_start()
        .strip_suffix("```")
        .map(|s| s.trim())
        .unwrap_or(stripped.trim_start())
}
