use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::Assistant, content: content.into() }
    }
}

/// A finished completion plus the token accounting a caller needs to persist
/// `tokens_used`/`cost_usd` alongside the message that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
}

/// A provider capable of chat-style completion, addressed by symbolic model
/// name rather than a concrete SDK type. Implementations wrap one upstream
/// provider each; the router (C1) is the only caller that knows about
/// multiple providers and fallback between them.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Stable identity used in usage-stats keys, e.g. `"groq:llama-3.3-70b"`.
    fn identity(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> CoreResult<ChatCompletion>;

    /// Streamed completion, yielding content deltas as they arrive. Used by
    /// the consultation engine's `STREAMING_FEEDBACK` task type.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> CoreResult<BoxStream<'static, CoreResult<String>>>;
}
