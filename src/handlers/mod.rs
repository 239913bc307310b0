//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `chat` - Streaming (SSE) and synchronous chat, with text or audio input

pub mod api;
pub mod chat;

pub use chat::{audio_chat, chat_sse, chat_sync};
