//! Pipeline orchestration: ingest → transcribe → chat → bridge.
//!
//! A run walks the state machine
//!
//! ```text
//! Idle ─► Transcribing ─► Forwarding ─► Streaming ─► Completed | Failed | Cancelled
//!               │              │
//!               ▼              ▼
//!       Failed | Cancelled   Failed | Cancelled
//! ```
//!
//! Text input goes from `Idle` to `Forwarding` directly. Every failure before streaming
//! starts (bad upload, failed recognition, chat request rejected) reaches the
//! client as one diagnostic fragment followed by a normal `Complete`, so the
//! connection always ends well-formed.
//!
//! A client that leaves before streaming starts ends the run as `Cancelled`
//! without the chat model ever being asked.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::asr::{TranscriptionFailure, Transcriber};
use crate::core::bridge::{BridgeOutcome, EventSink, StreamBridge, StreamEvent};
use crate::core::chat::ChatStreamSource;
use crate::core::ingest::{AudioIngestor, IngestError};

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    Transcribing,
    Forwarding,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }

    pub fn can_transition_to(self, next: StreamState) -> bool {
        use StreamState::*;
        matches!(
            (self, next),
            (Idle, Transcribing)
                | (Idle, Forwarding)
                | (Transcribing, Forwarding)
                | (Transcribing, Failed)
                | (Transcribing, Cancelled)
                | (Forwarding, Streaming)
                | (Forwarding, Failed)
                | (Forwarding, Cancelled)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Cancelled)
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Transcribing => "transcribing",
            StreamState::Forwarding => "forwarding",
            StreamState::Streaming => "streaming",
            StreamState::Completed => "completed",
            StreamState::Failed => "failed",
            StreamState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: StreamState,
    pub to: StreamState,
}

/// Tracks the state of a run and every state it passed through.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: StreamState,
    history: Vec<StreamState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            current: StreamState::Idle,
            history: vec![StreamState::Idle],
        }
    }
}

impl StateMachine {
    pub fn current(&self) -> StreamState {
        self.current
    }

    pub fn history(&self) -> &[StreamState] {
        &self.history
    }

    pub fn advance(&mut self, next: StreamState) -> Result<(), InvalidTransition> {
        if !self.current.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

/// What the caller sent.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    Audio {
        payload: Bytes,
        declared_format: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub input: PipelineInput,
    /// Conversation to continue; a fresh one is started when absent.
    pub session_id: Option<String>,
    /// Recognition language; falls back to the orchestrator default.
    pub language: Option<String>,
}

impl PipelineRequest {
    pub fn text(text: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            input: PipelineInput::Text(text.into()),
            session_id,
            language: None,
        }
    }

    pub fn audio(
        payload: impl Into<Bytes>,
        declared_format: Option<String>,
        session_id: Option<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            input: PipelineInput::Audio {
                payload: payload.into(),
                declared_format,
            },
            session_id,
            language,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub session_id: String,
    pub final_state: StreamState,
    /// States visited, starting with `Idle`.
    pub transitions: Vec<StreamState>,
    /// Set when the run reached `Streaming`.
    pub bridge_outcome: Option<BridgeOutcome>,
}

#[derive(Debug, Error)]
enum RecognitionError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionFailure),
}

/// Composes ingestion, transcription, chat and bridging for one request at a
/// time. Cheap to share; runs hold no common mutable state.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    ingestor: AudioIngestor,
    transcriber: Arc<dyn Transcriber>,
    chat: Arc<dyn ChatStreamSource>,
    bridge: StreamBridge,
    default_language: String,
}

impl PipelineOrchestrator {
    pub fn new(
        ingestor: AudioIngestor,
        transcriber: Arc<dyn Transcriber>,
        chat: Arc<dyn ChatStreamSource>,
        bridge: StreamBridge,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            ingestor,
            transcriber,
            chat,
            bridge,
            default_language: default_language.into(),
        }
    }

    pub fn ingestor(&self) -> &AudioIngestor {
        &self.ingestor
    }

    pub fn chat(&self) -> &Arc<dyn ChatStreamSource> {
        &self.chat
    }

    /// Drive one request to a terminal state, writing events to `sink`.
    pub async fn run<S>(&self, request: PipelineRequest, sink: &S) -> PipelineReport
    where
        S: EventSink + ?Sized,
    {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut machine = StateMachine::default();
        let cancel = CancellationToken::new();

        let prompt = match request.input {
            PipelineInput::Text(text) => {
                self.advance(&mut machine, StreamState::Forwarding, &session_id);
                text
            }
            PipelineInput::Audio {
                payload,
                declared_format,
            } => {
                self.advance(&mut machine, StreamState::Transcribing, &session_id);
                let language = request
                    .language
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| self.default_language.clone());

                let recognized = unless_closed(
                    sink,
                    &cancel,
                    self.recognize(payload, declared_format, &language),
                )
                .await;
                let Some(recognized) = recognized else {
                    info!(session_id = %session_id, "Client left during recognition");
                    self.advance(&mut machine, StreamState::Cancelled, &session_id);
                    return report(session_id, machine, None);
                };

                match recognized {
                    Ok(text) => {
                        info!(session_id = %session_id, chars = text.chars().count(), "Speech recognized");
                        self.advance(&mut machine, StreamState::Forwarding, &session_id);
                        text
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Speech recognition failed");
                        self.degrade(sink, format!("Speech recognition failed: {e}"))
                            .await;
                        self.advance(&mut machine, StreamState::Failed, &session_id);
                        return report(session_id, machine, None);
                    }
                }
            }
        };

        let opened = unless_closed(
            sink,
            &cancel,
            self.chat.stream(&prompt, &session_id, cancel.clone()),
        )
        .await;
        let Some(opened) = opened else {
            info!(session_id = %session_id, "Client left before the chat stream opened");
            self.advance(&mut machine, StreamState::Cancelled, &session_id);
            return report(session_id, machine, None);
        };

        let fragments = match opened {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Chat stream could not be opened");
                self.degrade(sink, format!("Chat request failed: {e}")).await;
                self.advance(&mut machine, StreamState::Failed, &session_id);
                return report(session_id, machine, None);
            }
        };

        self.advance(&mut machine, StreamState::Streaming, &session_id);
        let outcome = self.bridge.bridge(fragments, sink, &cancel).await;

        let final_state = match &outcome {
            BridgeOutcome::Completed { .. } => StreamState::Completed,
            BridgeOutcome::Failed { .. } | BridgeOutcome::TimedOut { .. } => StreamState::Failed,
            BridgeOutcome::Cancelled { .. } => StreamState::Cancelled,
        };
        self.advance(&mut machine, final_state, &session_id);
        info!(
            session_id = %session_id,
            state = %final_state,
            fragments = outcome.fragments(),
            "Pipeline run finished"
        );

        report(session_id, machine, Some(outcome))
    }

    async fn recognize(
        &self,
        payload: Bytes,
        declared_format: Option<String>,
        language: &str,
    ) -> Result<String, RecognitionError> {
        let audio = self
            .ingestor
            .ingest_blocking(payload, declared_format)
            .await?;
        Ok(self.transcriber.transcribe(audio, language).await?)
    }

    /// Graceful single-message answer for failures before streaming.
    async fn degrade<S>(&self, sink: &S, message: String)
    where
        S: EventSink + ?Sized,
    {
        if self
            .bridge
            .send_terminal(sink, StreamEvent::Fragment(message))
            .await
        {
            self.bridge.send_terminal(sink, StreamEvent::Complete).await;
        }
    }

    fn advance(&self, machine: &mut StateMachine, next: StreamState, session_id: &str) {
        if let Err(e) = machine.advance(next) {
            error!(session_id = %session_id, error = %e, "Pipeline state machine violated");
        }
    }
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("ingestor", &self.ingestor)
            .field("bridge", &self.bridge)
            .field("default_language", &self.default_language)
            .finish_non_exhaustive()
    }
}

/// Drive `work` unless the client goes away first, in which case `cancel`
/// fires and `work` is dropped unfinished.
async fn unless_closed<S, F>(sink: &S, cancel: &CancellationToken, work: F) -> Option<F::Output>
where
    S: EventSink + ?Sized,
    F: Future,
{
    tokio::select! {
        biased;
        _ = sink.closed() => {
            cancel.cancel();
            None
        }
        output = work => Some(output),
    }
}

fn report(
    session_id: String,
    machine: StateMachine,
    bridge_outcome: Option<BridgeOutcome>,
) -> PipelineReport {
    PipelineReport {
        session_id,
        final_state: machine.current(),
        transitions: machine.history().to_vec(),
        bridge_outcome,
    }
}
