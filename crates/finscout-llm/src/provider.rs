use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Generate an embedding vector for `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support embeddings or the request fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;
}

/// Run `chat` with an upper bound on wall-clock time.
///
/// # Errors
///
/// Returns [`LlmError::Timeout`] when the bound elapses, otherwise the provider's own error.
pub async fn chat_with_timeout<P: LlmProvider>(
    provider: &P,
    messages: &[Message],
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, provider.chat(messages)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            operation: "chat",
            seconds: timeout.as_secs(),
        }),
    }
}

/// Run `embed` with an upper bound on wall-clock time.
///
/// # Errors
///
/// Returns [`LlmError::Timeout`] when the bound elapses, otherwise the provider's own error.
pub async fn embed_with_timeout<P: LlmProvider>(
    provider: &P,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>, LlmError> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            operation: "embedding",
            seconds: timeout.as_secs(),
        }),
    }
}
