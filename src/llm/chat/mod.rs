pub mod openrouter;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use super::{ LlmConfig, ModelId };
use self::openrouter::OpenRouterChatClient;
use crate::models::chat::ChatMessage;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// One request for one model. Implementations do not retry or fall back;
/// that is left to the caller.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        model: &ModelId,
        messages: &[ChatMessage]
    ) -> Result<String, ChatError>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ChatError> {
    let client = OpenRouterChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
