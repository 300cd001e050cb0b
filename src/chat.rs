use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// One message in an OpenAI-compatible chat request. Content is either plain
/// text (analysis calls) or a list of parts (vision calls carrying an image).
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_data_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
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

/// The remote chat-completion capability. The pipeline only ever needs the
/// first choice's text content, so that is what implementations return.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, config: &ModelConfig, request: ChatRequest) -> Result<String>;
}

/// HTTP implementation over any OpenAI-compatible `chat/completions` endpoint.
pub struct HttpChatClient {
    client: Client,
}

impl HttpChatClient {
    pub fn new() -> Result<Self> {
        // Both models can be slow on large images, so give them a full minute.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn chat(&self, config: &ModelConfig, request: ChatRequest) -> Result<String> {
        let base = config.base_url.trim_end_matches('/');
        let url = format!("{base}/chat/completions");

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&config.api_key)
            .header("Content-Type", "application/json");

        if let Some(app_id) = config.app_id.as_deref().filter(|id| !id.trim().is_empty()) {
            builder = builder.header("X-App-ID", app_id);
        }

        log::debug!("sending chat request to {} (model {})", url, request.model);

        let response = builder
            .json(&request)
            .send()
            .await
            .with_context(|| format!("chat request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat endpoint returned {status}: {body}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat response")?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
