use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

/// Which hosted model API to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Environment variable holding the API key
    pub fn api_key_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_api_base(self) -> &'static str {
        match self {
            Provider::OpenAi => OPENAI_API_BASE,
            Provider::Anthropic => ANTHROPIC_API_BASE,
        }
    }
}

/// Generation constraints sent with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Temperature (0 = deterministic)
    pub temperature: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.0,
        }
    }
}

/// A language model: prompt in, text out
///
/// Implementations make a single attempt; a failure is reported to the caller
/// and never retried here.
pub trait ChatModel: Sync {
    fn complete(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = PipelineResult<String>> + Send;
}

/// Connection settings for a model client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub provider: Provider,
    /// API key (from the provider's environment variable)
    pub api_key: String,
    /// Model to use (e.g., "gpt-4o-mini-2024-07-18")
    pub model: String,
    /// Per-request timeout; expiry counts as a transport failure
    pub timeout: Duration,
    /// Override for the provider's API base URL
    pub api_base: Option<String>,
}

impl ClientConfig {
    /// Create config, reading the API key from the provider's environment variable
    pub fn from_env(
        provider: Provider,
        model: impl Into<String>,
        timeout: Duration,
        api_base: Option<String>,
    ) -> PipelineResult<Self> {
        let var = provider.api_key_var();
        let api_key = std::env::var(var)
            .map_err(|_| PipelineError::Config(format!("{} environment variable not set", var)))?;

        Ok(Self {
            provider,
            api_key,
            model: model.into(),
            timeout,
            api_base,
        })
    }

    fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(self.provider.default_api_base())
            .trim_end_matches('/')
    }

    fn http_client(&self) -> PipelineResult<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))
    }
}

/// Client for the provider selected in configuration
pub enum ModelClient {
    OpenAi(OpenAiClient),
    Anthropic(AnthropicClient),
}

impl ModelClient {
    pub fn new(config: ClientConfig) -> PipelineResult<Self> {
        Ok(match config.provider {
            Provider::OpenAi => ModelClient::OpenAi(OpenAiClient::new(config)?),
            Provider::Anthropic => ModelClient::Anthropic(AnthropicClient::new(config)?),
        })
    }
}

impl ChatModel for ModelClient {
    async fn complete(&self, prompt: &str, params: GenerationParams) -> PipelineResult<String> {
        match self {
            ModelClient::OpenAi(client) => client.complete(prompt, params).await,
            ModelClient::Anthropic(client) => client.complete(prompt, params).await,
        }
    }
}

/// OpenAI chat completions client
pub struct OpenAiClient {
    client: Client,
    config: ClientConfig,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> PipelineResult<Self> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }
}

impl ChatModel for OpenAiClient {
    async fn complete(&self, prompt: &str, params: GenerationParams) -> PipelineResult<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base()))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Api { status, body });
        }

        let response: ChatResponse = response.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| PipelineError::Transport("no text content in response".to_string()))
    }
}

/// Anthropic messages API client
pub struct AnthropicClient {
    client: Client,
    config: ClientConfig,
}

impl AnthropicClient {
    pub fn new(config: ClientConfig) -> PipelineResult<Self> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }
}

impl ChatModel for AnthropicClient {
    async fn complete(&self, prompt: &str, params: GenerationParams) -> PipelineResult<String> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: params.max_tokens,
            temperature: Some(params.temperature),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.api_base()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Api { status, body });
        }

        let response: AnthropicResponse = response.json().await?;

        // Extract text from the first text block
        response
            .content
            .into_iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| PipelineError::Transport("no text content in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}
