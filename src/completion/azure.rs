//! Azure OpenAI chat-completions client.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::CompletionError;
use super::{CompletionClient, CompletionRequest, MAX_IMAGES_PER_REQUEST};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::{alog_debug, alog_trace};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: Role,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for one Azure OpenAI resource.
///
/// The deployment is chosen per request, so a single client serves every
/// agent in the registry.
#[derive(Debug, Clone)]
pub struct AzureChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
}

impl AzureChatClient {
    pub fn new(endpoint: &str, api_key: &str, api_version: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
        })
    }

    /// Build a client from config, presence-checking endpoint and key.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_remote()?;
        let endpoint = config
            .azure
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::MissingConfig("AZURE_OPENAI_ENDPOINT".to_string()))?;
        let api_key = config
            .azure
            .api_key
            .as_deref()
            .ok_or_else(|| Error::MissingConfig("AZURE_OPENAI_API_KEY".to_string()))?;
        Self::new(endpoint, api_key, &config.azure.api_version)
    }

    /// URL for the chat-completions call of one deployment.
    pub fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Assemble the message list for a request.
fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: Role::System,
        content: MessageContent::Text(request.instruction.clone()),
    }];

    if !request.context.trim().is_empty() {
        messages.push(ChatMessage {
            role: Role::System,
            content: MessageContent::Text(format!("Context: {}", request.context)),
        });
    }

    let mut parts = vec![ContentPart::Text {
        text: request.user_input.clone(),
    }];
    if let Some(images) = &request.images {
        parts.extend(
            images
                .iter()
                .take(MAX_IMAGES_PER_REQUEST)
                .map(|bytes| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url(bytes),
                    },
                }),
        );
    }
    messages.push(ChatMessage {
        role: Role::User,
        content: MessageContent::Parts(parts),
    });
    messages
}

fn image_data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[async_trait]
impl CompletionClient for AzureChatClient {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, CompletionError> {
        let messages = build_messages(request);
        let body = ChatRequest {
            messages: &messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        alog_debug!(
            "Azure request deployment={} images={} context_chars={}",
            request.deployment,
            request.image_count(),
            request.context.len()
        );

        let response = self
            .client
            .post(self.completions_url(&request.deployment))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::from_status(status.as_u16(), &text, retry_after));
        }

        let text = response.text().await?;
        alog_trace!("Azure response: {}", text);
        parse_content(&text)
    }
}

fn parse_content(body: &str) -> std::result::Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| CompletionError::Upstream {
        status: None,
        message: format!("invalid response body: {}", e),
    })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::Upstream {
            status: None,
            message: "response contained no message content".to_string(),
        })
}
