//! Chat endpoints.
//!
//! Streaming endpoints answer with Server-Sent Events:
//!
//! ```text
//! data: <fragment>            one event per fragment, in order
//! event: complete
//! data: [DONE]                normal end
//! event: error
//! data: <message>             failure after streaming started
//! ```
//!
//! A client that closes the connection cancels the upstream model call.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::bridge::StreamEvent;
use crate::core::pipeline::PipelineRequest;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

/// Single-slot handoff between the pipeline and the response body.
const EVENT_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub message: Option<String>,
    #[serde(rename = "chatId")]
    pub chat_id: Option<String>,
}

impl ChatQuery {
    fn message(&self) -> AppResult<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("message must not be empty".to_string()))
    }
}

/// `GET /ai/chat/sse?message=&chatId=`
pub async fn chat_sse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let message = query.message()?.to_string();
    debug!(chat_id = ?query.chat_id, chars = message.chars().count(), "Text chat requested");

    Ok(spawn_pipeline(
        state,
        PipelineRequest::text(message, query.chat_id),
    ))
}

/// `GET /ai/chat/sync?message=&chatId=`
///
/// Bounded by the same session deadline as the streaming endpoints.
pub async fn chat_sync(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> AppResult<String> {
    let message = query.message()?;
    let session_id = query
        .chat_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let deadline = state.config.pipeline.max_session_duration;
    let answer = tokio::time::timeout(
        deadline,
        state.pipeline.chat().complete(message, &session_id),
    )
    .await
    .map_err(|_| {
        warn!(session_id = %session_id, ?deadline, "Sync chat exceeded session deadline");
        AppError::UpstreamTimeout(format!("no answer within {deadline:?}"))
    })??;
    info!(session_id = %session_id, chars = answer.chars().count(), "Sync chat answered");
    Ok(answer)
}

/// `POST /ai/audio_chat` (multipart: `audio`, optional `chatId`, `language`, `format`)
pub async fn audio_chat(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut audio: Option<(Bytes, Option<String>)> = None;
    let mut chat_id = None;
    let mut language = None;
    let mut format = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let hint = format_hint(field.file_name(), field.content_type());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                audio = Some((bytes, hint));
            }
            "chatId" => chat_id = Some(field.text().await.map_err(multipart_error)?),
            "language" => language = Some(field.text().await.map_err(multipart_error)?),
            "format" => format = Some(field.text().await.map_err(multipart_error)?),
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    let (payload, hint) =
        audio.ok_or_else(|| AppError::BadRequest("missing 'audio' file field".to_string()))?;
    let declared_format = format.filter(|f| !f.trim().is_empty()).or(hint);

    debug!(
        chat_id = ?chat_id,
        size = payload.len(),
        format = ?declared_format,
        "Audio chat requested"
    );

    Ok(spawn_pipeline(
        state,
        PipelineRequest::audio(payload, declared_format, chat_id, language),
    ))
}

/// Run the pipeline on its own task and expose its events as an SSE stream.
fn spawn_pipeline(
    state: Arc<AppState>,
    request: PipelineRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let report = state.pipeline.run(request, &tx).await;
        debug!(
            session_id = %report.session_id,
            state = %report.final_state,
            transitions = ?report.transitions,
            "Pipeline task finished"
        );
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(to_sse_event(event)), rx))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

pub fn to_sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Fragment(text) => Event::default().data(normalize_line_breaks(&text)),
        StreamEvent::Complete => Event::default().event("complete").data("[DONE]"),
        StreamEvent::Error(message) => Event::default()
            .event("error")
            .data(normalize_line_breaks(&message)),
    }
}

/// SSE cannot carry a bare carriage return inside `data`.
fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Prefer the upload's file extension, then its content type.
fn format_hint(file_name: Option<&str>, content_type: Option<&str>) -> Option<String> {
    file_name
        .filter(|name| name.contains('.'))
        .or(content_type.filter(|ct| *ct != "application/octet-stream"))
        .map(str::to_string)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}
