//! OpenAI chat-completions client, used as the completion oracle.

use crate::client::{Auth, HttpTransport};
use crate::error::{ImportError, Result};
use crate::oracle::CompletionOracle;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Async client for the OpenAI chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    transport: HttpTransport,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
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

impl OpenAiClient {
    /// Create a client for `api.openai.com` with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(
            api_key,
            "https://api.openai.com/v1",
            Duration::from_secs(300),
        )
    }

    /// Create a client against a different base URL (proxies, tests).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let transport = HttpTransport::new("OpenAI", base_url, Auth::Bearer(api_key.into()), timeout)?;
        Ok(Self { transport })
    }

    /// Override the rate limit (requests per second).
    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.transport = self.transport.with_rate_limit(per_second);
        self
    }
}

#[async_trait]
impl CompletionOracle for OpenAiClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response_body = self.transport.post_json("/chat/completions", &body).await?;
        let completion: ChatCompletion = serde_json::from_str(&response_body).map_err(|e| {
            ImportError::Parse(format!(
                "Invalid {} completion response: {}",
                self.transport.service(),
                e
            ))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ImportError::Parse("Completion response has no message content".to_string()))
    }
}
