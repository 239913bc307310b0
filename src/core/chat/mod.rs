//! Streaming chat sources.
//!
//! A [`ChatStreamSource`] turns a prompt into an ordered stream of
//! [`ChatFragment`]s. The stream is finite and ends either cleanly (the model
//! finished) or with a single `Err` item. Dropping the stream, or cancelling the
//! token passed to [`ChatStreamSource::stream`], stops the upstream request.

pub mod memory;
mod openai;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use memory::{
    ConversationMemory, DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_SECS,
};
pub use openai::{
    ChatConfig, DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_TIMEOUT_SECS,
    OpenAICompatibleChat,
};

/// Error type for chat operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request could not be sent or the connection broke before a response
    #[error("Request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status
    #[error("Chat API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response stream broke mid-way
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// One incremental piece of model output, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFragment {
    text: String,
}

impl ChatFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl From<String> for ChatFragment {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for ChatFragment {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for ChatFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered, finite stream of fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ChatResult<ChatFragment>> + Send>>;

/// A conversational model that answers a prompt incrementally.
#[async_trait]
pub trait ChatStreamSource: Send + Sync {
    /// Open a fragment stream for `prompt` within conversation `session_id`.
    ///
    /// An `Err` here means the stream never started. Once `cancel` fires the
    /// stream ends without yielding further items.
    async fn stream(
        &self,
        prompt: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> ChatResult<FragmentStream>;

    /// Run the stream to completion and return the concatenated answer.
    async fn complete(&self, prompt: &str, session_id: &str) -> ChatResult<String> {
        let mut stream = self
            .stream(prompt, session_id, CancellationToken::new())
            .await?;

        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(fragment?.as_str());
        }
        Ok(answer)
    }
}
