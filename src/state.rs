use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::asr::{SpeechTranscriptionClient, Transcriber};
use crate::core::bridge::{BridgeConfig, StreamBridge};
use crate::core::chat::{ChatStreamSource, OpenAICompatibleChat};
use crate::core::ingest::AudioIngestor;
use crate::core::pipeline::PipelineOrchestrator;

/// Shared application state handed to every handler
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: PipelineOrchestrator,
}

impl AppState {
    /// Build the production pipeline from configuration
    ///
    /// # Errors
    /// Returns an error if the ASR or chat client cannot be constructed.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        if !config.asr.is_configured() {
            warn!("ASR credentials not configured; audio requests will fail recognition");
        }
        if config.chat.api_key.is_empty() {
            warn!("CHAT_API_KEY not configured; requests are sent without authorization");
        }

        let transcriber = SpeechTranscriptionClient::new(config.asr.clone())
            .map_err(|e| format!("Failed to create ASR client: {e}"))?;
        let chat = OpenAICompatibleChat::new(config.chat.clone())
            .map_err(|e| format!("Failed to create chat client: {e}"))?;

        info!(
            asr_endpoint = %config.asr.endpoint,
            chat_model = %config.chat.model,
            history_window = config.chat.history_window,
            max_sessions = config.chat.max_sessions,
            "Pipeline clients initialized"
        );

        Ok(Self::with_components(
            config,
            Arc::new(transcriber),
            Arc::new(chat),
        ))
    }

    /// Build state around explicit collaborators
    pub fn with_components(
        config: ServerConfig,
        transcriber: Arc<dyn Transcriber>,
        chat: Arc<dyn ChatStreamSource>,
    ) -> Arc<Self> {
        let ingestor = AudioIngestor::new(
            config.pipeline.max_audio_bytes,
            config.pipeline.audio_temp_dir.clone(),
        );
        let bridge = StreamBridge::new(BridgeConfig {
            max_session_duration: config.pipeline.max_session_duration,
            ..BridgeConfig::default()
        });
        let pipeline = PipelineOrchestrator::new(
            ingestor,
            transcriber,
            chat,
            bridge,
            config.asr.default_language.clone(),
        );

        Arc::new(Self { config, pipeline })
    }
}
