//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;

use voicechat_gateway::ServerConfig;
use voicechat_gateway::config::{AuthApiSecret, PipelineConfig};
use voicechat_gateway::core::asr::{
    AsrConfig, Transcriber, TranscriptionFailure, TranscriptionResult,
};
use voicechat_gateway::core::chat::{
    ChatConfig, ChatError, ChatFragment, ChatResult, ChatStreamSource, FragmentStream,
};
use voicechat_gateway::core::ingest::ScopedAudio;

/// Helper function to create a minimal test configuration
pub fn create_minimal_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 3001,
        tls: None,
        asr: AsrConfig::default(),
        chat: ChatConfig::default(),
        pipeline: PipelineConfig::default(),
        auth_api_secrets: Vec::new(),
        auth_required: false,
        cors_allowed_origins: None,
        rate_limit_requests_per_second: 60,
        rate_limit_burst_size: 10,
    }
}

pub fn create_auth_config(secret: &str) -> ServerConfig {
    let mut config = create_minimal_config();
    config.auth_required = true;
    config.auth_api_secrets = vec![AuthApiSecret {
        id: "client-a".to_string(),
        secret: secret.to_string(),
    }];
    config
}

/// Transcriber returning a fixed result and recording what it was given.
pub struct StubTranscriber {
    result: TranscriptionResult,
    pub seen_formats: Mutex<Vec<String>>,
}

impl StubTranscriber {
    pub fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            seen_formats: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(failure: TranscriptionFailure) -> Arc<Self> {
        Arc::new(Self {
            result: Err(failure),
            seen_formats: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, audio: ScopedAudio, _language_hint: &str) -> TranscriptionResult {
        self.seen_formats
            .lock()
            .unwrap()
            .push(audio.format().to_string());
        self.result.clone()
    }
}

/// Chat source that answers with the prompt split into words.
#[derive(Default)]
pub struct EchoChat {
    pub prompts: Mutex<Vec<(String, String)>>,
    pub fail_open: bool,
}

impl EchoChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_open: true,
            ..Self::default()
        })
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatStreamSource for EchoChat {
    async fn stream(
        &self,
        prompt: &str,
        session_id: &str,
        _cancel: CancellationToken,
    ) -> ChatResult<FragmentStream> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), session_id.to_string()));

        if self.fail_open {
            return Err(ChatError::Api {
                status: 503,
                message: "model overloaded".to_string(),
            });
        }

        let fragments: Vec<ChatResult<ChatFragment>> = prompt
            .split_inclusive(' ')
            .map(|word| Ok(ChatFragment::new(word)))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}
