//! Speech recognition through a remote, signature-authenticated ASR endpoint.
//!
//! # Protocol
//!
//! A recognition is a single form-encoded `POST`:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `appKey` | application key |
//! | `q` | base64 audio payload |
//! | `format` | container (`wav`, `mp3`, ...) |
//! | `rate` / `channel` | sample rate in Hz / channel count |
//! | `type` | `1` (inline upload) |
//! | `langType` | language hint, e.g. `zh-CHS` |
//! | `salt` / `curtime` | per-request nonce / Unix seconds |
//! | `sign` / `signType` | signature (see [`signing`]) / `v2` |
//!
//! The JSON response carries the recognized text in `result`, either as a
//! string or as an array of strings.
//!
//! # Example
//!
//! ```rust,no_run
//! use voicechat_gateway::core::asr::{AsrConfig, SpeechTranscriptionClient, Transcriber};
//! use voicechat_gateway::core::ingest::AudioIngestor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SpeechTranscriptionClient::new(AsrConfig {
//!     app_key: "your-app-key".to_string(),
//!     app_secret: "your-app-secret".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let audio = AudioIngestor::default().ingest(&std::fs::read("hello.wav")?, Some("wav"))?;
//! let text = client.transcribe(audio, "zh-CHS").await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
pub mod messages;
pub mod signing;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::ingest::ScopedAudio;

pub use client::SpeechTranscriptionClient;
pub use config::{
    AsrConfig, DEFAULT_ASR_ENDPOINT, DEFAULT_ASR_LANGUAGE, DEFAULT_ASR_TIMEOUT_SECS,
};
pub use messages::TranscriptionRequest;
pub use signing::{compute_signature, truncate_input};

/// Why a recognition produced no text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptionFailure {
    /// Connection error or timeout talking to the ASR endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// The response body was empty, not JSON, or did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// The service answered but recognized nothing
    #[error("Recognition returned no text")]
    EmptyResult,

    /// The service rejected the request (non-success status or error code)
    #[error("ASR service error {code}: {message}")]
    Service { code: String, message: String },

    /// The ingested audio could not be read back
    #[error("Failed to read audio: {0}")]
    AudioRead(String),

    /// The client could not be constructed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Outcome of a recognition.
pub type TranscriptionResult = Result<String, TranscriptionFailure>;

/// Converts an ingested upload into text.
///
/// Implementations consume the handle so it is used exactly once; the temp
/// file is gone once `transcribe` returns.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: ScopedAudio, language_hint: &str) -> TranscriptionResult;
}
