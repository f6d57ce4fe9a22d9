//! Remote completion clients.
//!
//! The orchestrator only needs one capability from a hosted model: given an
//! instruction, a user message, some context and optional images, return
//! text. `CompletionClient` captures that; `AzureChatClient` implements it
//! against an Azure OpenAI chat-completions deployment.

mod azure;
mod error;

pub use azure::AzureChatClient;
pub use error::{CompletionError, CompletionErrorKind};

use async_trait::async_trait;
use std::sync::Arc;

/// Images attached to a request, shared across tasks of one workflow.
pub type Images = Arc<Vec<Vec<u8>>>;

/// Maximum images forwarded with a single request.
pub const MAX_IMAGES_PER_REQUEST: usize = 3;

/// One call to a hosted chat model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Deployment (model) name to call.
    pub deployment: String,
    /// Role-specific system instruction.
    pub instruction: String,
    pub user_input: String,
    /// Session history and dependency outputs. May be empty.
    pub context: String,
    pub images: Option<Images>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(deployment: &str, instruction: &str, user_input: &str) -> Self {
        Self {
            deployment: deployment.to_string(),
            instruction: instruction.to_string(),
            user_input: user_input.to_string(),
            context: String::new(),
            images: None,
            max_tokens: 1500,
            temperature: 0.7,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_images(mut self, images: Images) -> Self {
        if !images.is_empty() {
            self.images = Some(images);
        }
        self
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn image_count(&self) -> usize {
        self.images.as_ref().map_or(0, |i| i.len())
    }
}

/// Trait for hosted text-generation backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one completion request and return the generated text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
