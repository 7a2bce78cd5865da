//! Content generation via a chat-completion model.
//!
//! [`ContentGenerator`] is the single suspension point of a run: the workflow
//! awaits it exactly once. [`OpenAiGenerator`] talks to any OpenAI-compatible
//! `chat/completions` endpoint.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

/// System message sent ahead of the task.
const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Longest slice of a provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Produces raw text for a task description.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Send `task` to the model and return the raw response text.
    async fn generate(&self, task: &str) -> Result<String>;

    /// Identifier of the model answering requests.
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completion client.
#[derive(Clone)]
pub struct OpenAiGenerator {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    /// Create a client from run configuration.
    ///
    /// A blank credential is reported as [`AgentError::Authentication`].
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::Authentication(
                "no API key configured for the model provider".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "harness-agent/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Generation(format!("failed to create HTTP client: {e}")))?;

        Ok(OpenAiGenerator {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: format!(
                "{}/chat/completions",
                config.api_base_url.trim_end_matches('/')
            ),
            client,
        })
    }

    /// Full URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, task: &str) -> Result<String> {
        if task.trim().is_empty() {
            return Err(AgentError::Configuration(
                "task description must not be empty".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: task,
                },
            ],
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "sending generation request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate(&body, MAX_ERROR_BODY);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AgentError::Authentication(format!("provider rejected credential ({status}): {body}"))
                }
                _ => AgentError::Generation(format!("provider returned {status}: {body}")),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Generation(format!("failed to decode response: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Generation("provider returned no choices".to_string()))?;

        let content = choice.message.content.unwrap_or_default();
        debug!(bytes = content.len(), "generation response received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
