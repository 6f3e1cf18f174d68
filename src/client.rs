use crate::config::ApiSettings;
use crate::error::JudgeError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Longest pause between two attempts
const MAX_RETRY_SLEEP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A chat endpoint that turns a conversation into one reply
pub trait ChatBackend {
    /// Model name reported in stored records
    fn model_name(&self) -> &str;

    fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<String, JudgeError>> + Send;
}

/// OpenAI-compatible chat completions client with rate limiting and retries
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    settings: ApiSettings,
    /// Last request time, shared by concurrent callers
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiChat {
    /// Create a client, reading the API key from `settings.env_var_api_key`
    pub fn from_env(settings: ApiSettings) -> Result<Self, JudgeError> {
        let api_key = std::env::var(&settings.env_var_api_key)
            .map_err(|_| JudgeError::MissingApiKey(settings.env_var_api_key.clone()))?;
        Ok(Self::new(settings, api_key))
    }

    pub fn new(settings: ApiSettings, api_key: String) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&settings.api_endpoint);

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
        {
            Ok(http_client) => Client::with_config(openai_config).with_http_client(http_client),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                Client::with_config(openai_config)
            }
        };

        Self {
            client,
            settings,
            last_request: Mutex::new(None),
        }
    }

    /// Enforce rate limiting for API requests
    async fn enforce_rate_limit(last_request: &Mutex<Option<Instant>>, rate_limit_rps: f64) {
        if rate_limit_rps <= 0.0 {
            return;
        }

        let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);
        let mut last_request = last_request.lock().await;

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    /// Backoff before retry number `attempt` (1-based)
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.settings.retry_sleep_ms.saturating_mul(factor)).min(MAX_RETRY_SLEEP)
    }

    /// Build the chat completion request
    fn build_request(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CreateChatCompletionRequest, async_openai::error::OpenAIError> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .messages(messages)
            .temperature(self.settings.temperature as f32)
            .max_tokens(self.settings.max_tokens)
            .build()
    }

    async fn attempt(&self, request: CreateChatCompletionRequest) -> Result<String, String> {
        Self::enforce_rate_limit(&self.last_request, self.settings.rate_limit_rps).await;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        extract_content(response).ok_or_else(|| "response contained no message content".to_string())
    }
}

impl ChatBackend for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, JudgeError> {
        let request = self.build_request(messages).map_err(|e| JudgeError::JudgeApi {
            attempts: 0,
            message: e.to_string(),
        })?;

        let max_attempts = self.settings.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(request.clone()).await {
                Ok(content) => return Ok(content),
                Err(message) => {
                    tracing::warn!(
                        model = %self.settings.model,
                        attempt,
                        max_attempts,
                        error = %message,
                        "chat completion failed"
                    );
                    last_error = message;
                    if attempt < max_attempts {
                        sleep(self.retry_delay(attempt)).await;
                    }
                }
            }
        }

        Err(JudgeError::JudgeApi {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

fn to_request_message(
    message: &ChatMessage,
) -> Result<ChatCompletionRequestMessage, async_openai::error::OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

/// First choice's text, if any
fn extract_content(response: CreateChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}
