//! Conversation summarization capability.
//!
//! Compaction hands the text it wants condensed to a [`Summarizer`]. The
//! bundled [`LlmSummarizer`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint. Failures are returned as-is; there is no
//! retry and no fallback summary.

use crate::config::SummarizerConfig;
use crate::{MemkeepError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request timeout for summarization calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// System prompt sent ahead of the conversation to summarize.
pub const COMPACT_PROMPT: &str = r#"You are performing a CONTEXT CHECKPOINT COMPACTION. Summarize the conversation below so another assistant can resume it.

Include:
- Current progress and key decisions made
- Important context, constraints, or user preferences
- What remains to be done (clear next steps)
- Any critical data, examples, or references needed to continue

Be concise, structured, and factual."#;

/// Turns a block of conversation text into a shorter summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by a chat-completions HTTP API.
pub struct LlmSummarizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmSummarizer {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MemkeepError::Summarizer(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        })
    }

    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::new(config.base_url.clone(), config.model.clone(), api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, text: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: COMPACT_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        debug!("Summarizing {} bytes with {}", text.len(), self.model);

        let mut request = self.client.post(self.endpoint()).json(&self.build_request(text));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MemkeepError::Summarizer(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MemkeepError::Summarizer(e.to_string()))?;
        if !status.is_success() {
            return Err(MemkeepError::Summarizer(format!("HTTP {}: {}", status, body)));
        }

        parse_summary(&body)
    }
}

/// Extract the first choice's text from a chat-completions response body.
fn parse_summary(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| MemkeepError::Summarizer("empty summary in response".to_string()))
}
