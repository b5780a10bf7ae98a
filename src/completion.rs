//! Completion Client: forwards the conversation so far to a remote
//! chat-completion endpoint and returns the assistant's reply.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::prompts::SystemPrompts;
use crate::transcript::{Role, Turn};

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Unusable response: {0}")]
    BadResponse(String),
}

/// External collaborator that turns the conversation so far plus the newest
/// user utterance into assistant text. Implementations must resolve or
/// reject; they must never hang past their own timeout.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prior: &[Turn], user_text: &str) -> Result<String, CompletionError>;
}

/// One automatic retry on failure, then give up. The controller converts the
/// final failure into a fallback assistant turn, so the conversation is never
/// left hanging in Processing.
pub async fn complete_with_retry<C: CompletionClient + ?Sized>(
    client: &C,
    prior: &[Turn],
    user_text: &str,
) -> Result<String, CompletionError> {
    match client.complete(prior, user_text).await {
        Ok(reply) => Ok(reply),
        Err(first) => {
            log::warn!("Completion failed, retrying once: {}", first);
            client.complete(prior, user_text).await
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completion client.
pub struct OpenAiCompletion {
    client: Client,
    api_key: String,
    config: CompletionConfig,
}

impl OpenAiCompletion {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, CompletionConfig::default())
    }

    pub fn with_config(api_key: String, config: CompletionConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            config,
        }
    }

    fn wire_messages<'a>(prior: &'a [Turn], user_text: &'a str) -> Vec<WireMessage<'a>> {
        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(WireMessage {
            role: "system",
            content: SystemPrompts::voice_tutor(),
        });
        for turn in prior {
            messages.push(WireMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &turn.content,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: user_text,
        });
        messages
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, prior: &[Turn], user_text: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let request = ChatRequest {
            model: &self.config.model,
            messages: Self::wire_messages(prior, user_text),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::BadResponse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::BadResponse("No completion choices".to_string()))?;

        if content.trim().is_empty() {
            return Err(CompletionError::BadResponse(
                "Empty completion content".to_string(),
            ));
        }

        Ok(content)
    }
}
