pub mod asr;
pub mod bridge;
pub mod chat;
pub mod ingest;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use asr::{
    AsrConfig, SpeechTranscriptionClient, Transcriber, TranscriptionFailure, TranscriptionResult,
};

pub use bridge::{BridgeConfig, BridgeOutcome, EventSink, SinkClosed, StreamBridge, StreamEvent};

pub use chat::{
    ChatConfig, ChatError, ChatFragment, ChatResult, ChatStreamSource, ConversationMemory,
    FragmentStream, OpenAICompatibleChat,
};

pub use ingest::{AudioFormat, AudioIngestor, IngestError, ScopedAudio};

pub use pipeline::{
    PipelineInput, PipelineOrchestrator, PipelineReport, PipelineRequest, StreamState,
};
