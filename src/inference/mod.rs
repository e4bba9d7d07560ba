//! Language-model and embedding gateway.
//!
//! Provides the [`LanguageModel`] and [`EmbeddingProvider`] traits, the message
//! types exchanged with a model, and an Ollama-backed implementation of both
//! created via [`create_client`].

pub mod ollama;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::InferenceConfig;

/// One-shot, forward-only sequence of response fragments from a single inference call.
pub type TokenStream = BoxStream<'static, Result<String, InferenceError>>;

/// Errors from the inference gateway.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inference API error: {0}")]
    Api(String),
    #[error("inference server not running at {0}. Start it with: ollama serve")]
    ServerNotRunning(String),
    #[error("model '{0}' not found. Pull it with: tichat model pull")]
    ModelNotFound(String),
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Completion and streaming chat against a language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single non-streaming completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;

    /// Start a streaming chat over `messages`. Errors before the first fragment
    /// are returned directly; later failures arrive as stream items.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, InferenceError>;

    fn model_name(&self) -> &str;
}

/// Trait for embedding text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of text strings, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError>;

    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::Api("empty embedding response".into()))
    }

    fn embedding_model(&self) -> &str;
}

/// Create the Ollama gateway from config.
pub fn create_client(config: &InferenceConfig) -> Result<ollama::OllamaClient, InferenceError> {
    ollama::OllamaClient::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
        assert_eq!(Role::User.to_string(), "user");
    }
}
