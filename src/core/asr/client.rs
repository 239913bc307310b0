//! Signed ASR client.
//!
//! One recognition is one blocking round-trip: the scoped audio file is read,
//! base64 encoded, signed and POSTed as a form. The client never retries; a
//! single failed attempt is surfaced to the caller.

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::config::AsrConfig;
use super::messages::{TranscriptionRequest, parse_response};
use super::signing::{SIGNATURE_VERSION, compute_signature, current_timestamp, generate_salt};
use super::{TranscriptionFailure, TranscriptionResult, Transcriber};
use crate::core::ingest::ScopedAudio;

/// User-Agent header value for ASR requests.
const USER_AGENT: &str = concat!("voicechat-gateway/", env!("CARGO_PKG_VERSION"));

/// Upload type meaning "audio inlined in the request body".
const UPLOAD_TYPE_INLINE: &str = "1";

/// Client for the signed, form-encoded ASR endpoint.
#[derive(Debug, Clone)]
pub struct SpeechTranscriptionClient {
    config: AsrConfig,
    http_client: Client,
}

impl SpeechTranscriptionClient {
    /// Build a client from explicit configuration.
    pub fn new(config: AsrConfig) -> Result<Self, TranscriptionFailure> {
        config
            .validate()
            .map_err(TranscriptionFailure::Configuration)?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                TranscriptionFailure::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &AsrConfig {
        &self.config
    }

    /// Assemble a freshly salted and timestamped request for `audio_bytes`.
    pub fn build_request(
        &self,
        audio_bytes: &[u8],
        audio: &ScopedAudio,
        language_hint: &str,
    ) -> TranscriptionRequest {
        let payload_base64 = BASE64.encode(audio_bytes);
        let salt = generate_salt();
        let timestamp_seconds = current_timestamp();
        let signature = compute_signature(
            &self.config.app_key,
            &payload_base64,
            &salt,
            &timestamp_seconds,
            &self.config.app_secret,
        );

        let (sample_rate_hz, channel_count) = match audio.info() {
            Some(info) => (info.sample_rate, info.channels),
            None => (self.config.default_sample_rate, self.config.default_channels),
        };

        let language_hint = if language_hint.trim().is_empty() {
            self.config.default_language.clone()
        } else {
            language_hint.trim().to_string()
        };

        TranscriptionRequest {
            app_key: self.config.app_key.clone(),
            payload_base64,
            format: audio.format().as_str().to_string(),
            sample_rate_hz,
            channel_count,
            upload_type: UPLOAD_TYPE_INLINE.to_string(),
            language_hint,
            salt,
            timestamp_seconds,
            signature,
            signature_version: SIGNATURE_VERSION.to_string(),
        }
    }

    async fn send(&self, request: &TranscriptionRequest) -> TranscriptionResult {
        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .form(request)
            .send()
            .await
            .map_err(|e| TranscriptionFailure::Network(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionFailure::Network(describe_transport_error(&e)))?;

        if !status.is_success() {
            warn!(status = %status, "ASR endpoint returned an error status");
            return Err(TranscriptionFailure::Service {
                code: status.as_u16().to_string(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        parse_response(&body)
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}

#[async_trait]
impl Transcriber for SpeechTranscriptionClient {
    async fn transcribe(&self, audio: ScopedAudio, language_hint: &str) -> TranscriptionResult {
        let started = Instant::now();

        let audio_bytes = tokio::fs::read(audio.path())
            .await
            .map_err(|e| TranscriptionFailure::AudioRead(e.to_string()))?;

        let request = self.build_request(&audio_bytes, &audio, language_hint);
        drop(audio_bytes);

        debug!(
            size = audio.size(),
            format = %audio.format(),
            rate = request.sample_rate_hz,
            channels = request.channel_count,
            language = %request.language_hint,
            "Submitting audio for recognition"
        );

        let result = self.send(&request).await;

        // Unlinks the temp file before the caller moves on.
        drop(audio);

        match &result {
            Ok(text) => info!(
                chars = text.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Recognition succeeded"
            ),
            Err(e) => warn!(
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Recognition failed"
            ),
        }

        result
    }
}
