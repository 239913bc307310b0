//! Streaming client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! The response is consumed as Server-Sent Events: every `data:` line carries
//! a JSON chunk whose `choices[0].delta.content` is the next fragment, and
//! `data: [DONE]` ends the answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::memory::ConversationMemory;
use super::{ChatError, ChatFragment, ChatMessage, ChatResult, ChatStreamSource, FragmentStream};

/// DashScope's OpenAI-compatible mode.
pub const DEFAULT_CHAT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

pub const DEFAULT_CHAT_MODEL: &str = "qwen-plus";

/// Bound on connecting and receiving response headers; the body itself may
/// stream for longer.
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("voicechat-gateway/", env!("CARGO_PKG_VERSION"));

const DONE_MARKER: &str = "[DONE]";

/// Connection settings for the chat provider.
#[derive(Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub history_window: usize,
    /// Upper bound on remembered conversations
    pub max_sessions: u64,
    /// Conversations unused for this long are forgotten
    pub session_idle_timeout: Duration,
    pub timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            system_prompt: None,
            history_window: super::DEFAULT_HISTORY_WINDOW,
            max_sessions: super::DEFAULT_MAX_SESSIONS,
            session_idle_timeout: Duration::from_secs(super::DEFAULT_SESSION_IDLE_SECS),
            timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
        }
    }
}

impl ChatConfig {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.base_url)
            .map_err(|e| format!("Invalid chat base URL '{}': {e}", self.base_url))?;
        if self.model.trim().is_empty() {
            return Err("Chat model must not be empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err("Chat timeout must be greater than zero".to_string());
        }
        if self.max_sessions == 0 {
            return Err("Chat max sessions must be greater than zero".to_string());
        }
        if self.session_idle_timeout.is_zero() {
            return Err("Chat session idle timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("history_window", &self.history_window)
            .field("max_sessions", &self.max_sessions)
            .field("session_idle_timeout", &self.session_idle_timeout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// What one SSE line contributes to the answer.
#[derive(Debug, PartialEq, Eq)]
enum LineEvent {
    Content(String),
    Done,
    Skip,
}

/// Splits a byte stream into complete lines, holding partial ones (including
/// split UTF-8 sequences) until the rest arrives.
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> ChatResult<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|e| ChatError::Parse(format!("invalid UTF-8 in stream: {e}")))?;
            lines.push(line);
        }
        Ok(lines)
    }

    /// Whatever is left once the body ends without a trailing newline.
    fn finish(&mut self) -> ChatResult<Option<String>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.buffer);
        String::from_utf8(rest)
            .map(Some)
            .map_err(|e| ChatError::Parse(format!("invalid UTF-8 in stream: {e}")))
    }
}

fn parse_line(line: &str) -> ChatResult<LineEvent> {
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, `event:`/`id:` fields and blank separators.
        return Ok(LineEvent::Skip);
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim() == DONE_MARKER {
        return Ok(LineEvent::Done);
    }
    if data.trim().is_empty() {
        return Ok(LineEvent::Skip);
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        // Providers report mid-stream failures as a JSON error object.
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(value) if value.get("error").is_some() => {
                ChatError::Stream(error_message(&value["error"]))
            }
            _ => ChatError::Parse(format!("invalid stream chunk: {e}")),
        }
    })?;

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
    {
        Some(content) if !content.is_empty() => Ok(LineEvent::Content(content)),
        _ => Ok(LineEvent::Skip),
    }
}

fn error_message(error: &serde_json::Value) -> String {
    error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Chat client for any provider speaking the OpenAI streaming protocol.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleChat {
    config: ChatConfig,
    http_client: Client,
    memory: Arc<ConversationMemory>,
}

impl OpenAICompatibleChat {
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        let memory = Arc::new(ConversationMemory::with_limits(
            config.history_window,
            config.max_sessions,
            config.session_idle_timeout,
        ));
        Self::with_memory(config, memory)
    }

    /// Build a client that records turns into a shared `memory`.
    pub fn with_memory(config: ChatConfig, memory: Arc<ConversationMemory>) -> ChatResult<Self> {
        config.validate().map_err(ChatError::Configuration)?;

        let http_client = Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ChatError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            memory,
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    fn build_messages(&self, prompt: &str, session_id: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system_prompt) = self
            .config
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.extend(self.memory.history(session_id));
        messages.push(ChatMessage::user(prompt));
        messages
    }
}

#[async_trait]
impl ChatStreamSource for OpenAICompatibleChat {
    async fn stream(
        &self,
        prompt: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> ChatResult<FragmentStream> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: self.build_messages(prompt, session_id),
            stream: true,
        };

        debug!(
            session_id = %session_id,
            model = %self.config.model,
            history = body.messages.len() - 1,
            "Opening chat stream"
        );

        let mut request = self
            .http_client
            .post(self.config.completions_url())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ChatError::Request("cancelled before the response arrived".to_string()));
            }
            result = tokio::time::timeout(self.config.timeout, request.send()) => match result {
                Err(_) => {
                    return Err(ChatError::Request(format!(
                        "no response within {}s",
                        self.config.timeout.as_secs()
                    )));
                }
                Ok(Err(e)) => return Err(ChatError::Request(e.to_string())),
                Ok(Ok(response)) => response,
            },
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").map(error_message))
                .unwrap_or(text);
            warn!(session_id = %session_id, status = %status, "Chat provider rejected request");
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let memory = Arc::clone(&self.memory);
        let session_id = session_id.to_string();
        let prompt = prompt.to_string();
        let mut body = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = LineDecoder::default();
            let mut answer = String::new();
            let mut fragments = 0usize;

            'read: loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(session_id = %session_id, fragments, "Chat stream cancelled");
                        return;
                    }
                    next = body.next() => next,
                };

                let exhausted = next.is_none();
                let lines = match next {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => {
                        yield Err(ChatError::Stream(e.to_string()));
                        return;
                    }
                    None => decoder.finish().map(|rest| rest.into_iter().collect()),
                };
                let lines: Vec<String> = match lines {
                    Ok(lines) => lines,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                for line in lines {
                    match parse_line(&line) {
                        Ok(LineEvent::Content(text)) => {
                            answer.push_str(&text);
                            fragments += 1;
                            yield Ok(ChatFragment::from(text));
                        }
                        Ok(LineEvent::Done) => break 'read,
                        Ok(LineEvent::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }

                if exhausted {
                    break;
                }
            }

            info!(session_id = %session_id, fragments, chars = answer.chars().count(), "Chat stream completed");
            memory.commit_turn(&session_id, ChatMessage::user(prompt), ChatMessage::assistant(answer));
        };

        Ok(Box::pin(stream))
    }
}
