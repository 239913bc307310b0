//! Bridges a chat fragment stream onto an outbound push connection.
//!
//! The bridge is a single-slot handoff: a fragment is pulled from upstream only
//! after the previous one was accepted by the [`EventSink`]. With the
//! production sink (an `mpsc` channel of capacity 1 drained by the SSE
//! response) at most one fragment is in flight between model and socket.
//!
//! Every run ends in exactly one [`BridgeOutcome`]:
//!
//! | Upstream / client | Sent to client | Outcome |
//! |-------------------|----------------|---------|
//! | stream ends | `Complete` | `Completed` |
//! | stream yields `Err` | `Error(message)` | `Failed` |
//! | deadline expires | `Error(timeout)` | `TimedOut` |
//! | client gone | nothing | `Cancelled` |
//!
//! In the last two cases the upstream [`CancellationToken`] is cancelled and
//! the stream dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::chat::FragmentStream;

/// Default upper bound on a streamed answer (3 minutes).
pub const DEFAULT_MAX_SESSION_DURATION: Duration = Duration::from_secs(180);

/// How long a terminal event may wait for a slow client.
pub const DEFAULT_TERMINAL_GRACE: Duration = Duration::from_secs(5);

/// One event on the outbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of the answer, in production order.
    Fragment(String),
    /// The answer is finished.
    Complete,
    /// The answer broke off; carries a human-readable message.
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

/// The client is no longer reading.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Outbound side of a stream.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Hand one event to the transport. Resolves once the event was accepted.
    async fn send(&self, event: StreamEvent) -> Result<(), SinkClosed>;

    /// Resolves when the client went away.
    async fn closed(&self);
}

#[async_trait]
impl EventSink for mpsc::Sender<StreamEvent> {
    async fn send(&self, event: StreamEvent) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, event).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub max_session_duration: Duration,
    pub terminal_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_session_duration: DEFAULT_MAX_SESSION_DURATION,
            terminal_grace: DEFAULT_TERMINAL_GRACE,
        }
    }
}

/// How a bridged stream ended. `fragments` counts events accepted by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Completed { fragments: usize },
    Failed { fragments: usize, message: String },
    TimedOut { fragments: usize },
    Cancelled { fragments: usize },
}

impl BridgeOutcome {
    pub fn fragments(&self) -> usize {
        match self {
            BridgeOutcome::Completed { fragments }
            | BridgeOutcome::Failed { fragments, .. }
            | BridgeOutcome::TimedOut { fragments }
            | BridgeOutcome::Cancelled { fragments } => *fragments,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamBridge {
    config: BridgeConfig,
}

impl StreamBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Forward `fragments` to `sink` until the stream ends, fails, times out
    /// or the client disconnects.
    pub async fn bridge<S>(
        &self,
        mut fragments: FragmentStream,
        sink: &S,
        cancel: &CancellationToken,
    ) -> BridgeOutcome
    where
        S: EventSink + ?Sized,
    {
        let deadline = tokio::time::sleep_until(Instant::now() + self.config.max_session_duration);
        tokio::pin!(deadline);

        let mut delivered = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => {
                    return self.abandon(fragments, cancel, delivered);
                }
                _ = &mut deadline => {
                    return self.expire(fragments, sink, cancel, delivered).await;
                }
                next = fragments.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    let sent = tokio::select! {
                        biased;
                        _ = &mut deadline => {
                            return self.expire(fragments, sink, cancel, delivered).await;
                        }
                        sent = sink.send(StreamEvent::Fragment(fragment.into_string())) => sent,
                    };
                    if sent.is_err() {
                        return self.abandon(fragments, cancel, delivered);
                    }
                    delivered += 1;
                }
                Some(Err(e)) => {
                    drop(fragments);
                    let message = e.to_string();
                    warn!(fragments = delivered, error = %message, "Upstream stream failed");
                    self.send_terminal(sink, StreamEvent::Error(message.clone()))
                        .await;
                    return BridgeOutcome::Failed {
                        fragments: delivered,
                        message,
                    };
                }
                None => {
                    drop(fragments);
                    debug!(fragments = delivered, "Upstream stream completed");
                    self.send_terminal(sink, StreamEvent::Complete).await;
                    return BridgeOutcome::Completed {
                        fragments: delivered,
                    };
                }
            }
        }
    }

    /// Send a terminal event, giving up after the grace period.
    pub async fn send_terminal<S>(&self, sink: &S, event: StreamEvent) -> bool
    where
        S: EventSink + ?Sized,
    {
        match tokio::time::timeout(self.config.terminal_grace, sink.send(event)).await {
            Ok(Ok(())) => true,
            Ok(Err(SinkClosed)) => {
                debug!("Client gone before terminal event");
                false
            }
            Err(_) => {
                warn!(
                    grace_ms = self.config.terminal_grace.as_millis() as u64,
                    "Client did not accept terminal event in time"
                );
                false
            }
        }
    }

    fn abandon(
        &self,
        fragments: FragmentStream,
        cancel: &CancellationToken,
        delivered: usize,
    ) -> BridgeOutcome {
        cancel.cancel();
        drop(fragments);
        info!(fragments = delivered, "Client disconnected, upstream cancelled");
        BridgeOutcome::Cancelled {
            fragments: delivered,
        }
    }

    async fn expire<S>(
        &self,
        fragments: FragmentStream,
        sink: &S,
        cancel: &CancellationToken,
        delivered: usize,
    ) -> BridgeOutcome
    where
        S: EventSink + ?Sized,
    {
        cancel.cancel();
        drop(fragments);
        let secs = self.config.max_session_duration.as_secs();
        warn!(fragments = delivered, max_secs = secs, "Session timed out, upstream cancelled");
        self.send_terminal(
            sink,
            StreamEvent::Error(format!(
                "Session timed out after {secs}s without completing"
            )),
        )
        .await;
        BridgeOutcome::TimedOut {
            fragments: delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat::{ChatError, ChatFragment, ChatResult};
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Records events and starts failing after `accept` fragments.
    struct RecordingSink {
        events: Mutex<Vec<StreamEvent>>,
        accept: usize,
    }

    impl RecordingSink {
        fn new(accept: usize) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                accept,
            }
        }

        async fn events(&self) -> Vec<StreamEvent> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event: StreamEvent) -> Result<(), SinkClosed> {
            let mut events = self.events.lock().await;
            let fragments = events.iter().filter(|e| !e.is_terminal()).count();
            if !event.is_terminal() && fragments >= self.accept {
                return Err(SinkClosed);
            }
            events.push(event);
            Ok(())
        }

        async fn closed(&self) {
            futures::future::pending::<()>().await
        }
    }

    fn fragments(items: Vec<ChatResult<ChatFragment>>) -> FragmentStream {
        Box::pin(stream::iter(items))
    }

    fn short_config() -> BridgeConfig {
        BridgeConfig {
            max_session_duration: Duration::from_millis(100),
            terminal_grace: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_fragments_forwarded_in_order() {
        let sink = RecordingSink::new(usize::MAX);
        let words = ["The", " quick", " brown", " fox", "", " jumps"];
        let stream = fragments(words.iter().map(|w| Ok(ChatFragment::from(*w))).collect());

        let outcome = StreamBridge::default()
            .bridge(stream, &sink, &CancellationToken::new())
            .await;

        assert_eq!(outcome, BridgeOutcome::Completed { fragments: 6 });
        let mut expected: Vec<StreamEvent> = words
            .iter()
            .map(|w| StreamEvent::Fragment(w.to_string()))
            .collect();
        expected.push(StreamEvent::Complete);
        assert_eq!(sink.events().await, expected);
    }

    #[tokio::test]
    async fn test_zero_fragments_completes_immediately() {
        let sink = RecordingSink::new(usize::MAX);

        let outcome = StreamBridge::default()
            .bridge(fragments(vec![]), &sink, &CancellationToken::new())
            .await;

        assert_eq!(outcome, BridgeOutcome::Completed { fragments: 0 });
        assert_eq!(sink.events().await, vec![StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn test_write_failure_cancels_upstream() {
        let k = 3;
        let sink = RecordingSink::new(k);
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let endless: FragmentStream = Box::pin(stream::iter(0..).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ChatFragment::new(format!("f{i}")))
        }));
        let cancel = CancellationToken::new();

        let outcome = StreamBridge::default().bridge(endless, &sink, &cancel).await;

        assert_eq!(outcome, BridgeOutcome::Cancelled { fragments: k });
        assert!(cancel.is_cancelled());
        // Fragment k+1 was pulled and its write failed; nothing after it.
        assert_eq!(pulled.load(Ordering::SeqCst), k + 1);
        let events = sink.events().await;
        assert_eq!(events.len(), k);
        assert!(events.iter().all(|e| !e.is_terminal()));
    }

    #[tokio::test]
    async fn test_upstream_error_flushes_partial_output() {
        let sink = RecordingSink::new(usize::MAX);
        let stream = fragments(vec![
            Ok("Hel".into()),
            Ok("lo".into()),
            Err(ChatError::Stream("connection reset".into())),
            Ok("never".into()),
        ]);

        let outcome = StreamBridge::default()
            .bridge(stream, &sink, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            BridgeOutcome::Failed {
                fragments: 2,
                message: "Stream error: connection reset".to_string()
            }
        );
        assert_eq!(
            sink.events().await,
            vec![
                StreamEvent::Fragment("Hel".into()),
                StreamEvent::Fragment("lo".into()),
                StreamEvent::Error("Stream error: connection reset".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_deadline_cancels_and_reports_timeout() {
        let sink = RecordingSink::new(usize::MAX);
        let stalled: FragmentStream =
            Box::pin(stream::iter(vec![Ok(ChatFragment::from("first"))]).chain(stream::pending()));
        let cancel = CancellationToken::new();

        let outcome = StreamBridge::new(short_config())
            .bridge(stalled, &sink, &cancel)
            .await;

        assert_eq!(outcome, BridgeOutcome::TimedOut { fragments: 1 });
        assert!(cancel.is_cancelled());
        let events = sink.events().await;
        assert_eq!(events[0], StreamEvent::Fragment("first".into()));
        assert!(matches!(&events[1], StreamEvent::Error(msg) if msg.contains("timed out")));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_single_slot_handoff() {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(1);
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let stream: FragmentStream = Box::pin(stream::iter(0..5).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ChatFragment::new(i.to_string()))
        }));

        let handle = tokio::spawn(async move {
            StreamBridge::default()
                .bridge(stream, &tx, &CancellationToken::new())
                .await
        });

        // Nobody reads yet: one event fills the slot, the second pull blocks on send.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), 2);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }

        assert_eq!(handle.await.unwrap(), BridgeOutcome::Completed { fragments: 5 });
        assert_eq!(received.len(), 6);
        assert_eq!(received[0], StreamEvent::Fragment("0".into()));
        assert_eq!(received[4], StreamEvent::Fragment("4".into()));
        assert_eq!(received[5], StreamEvent::Complete);
    }

    #[tokio::test]
    async fn test_closed_channel_cancels_before_pulling() {
        let (tx, rx) = mpsc::channel::<StreamEvent>(1);
        drop(rx);
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let stream: FragmentStream = Box::pin(stream::iter(0..5).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ChatFragment::new(i.to_string()))
        }));
        let cancel = CancellationToken::new();

        let outcome = StreamBridge::default().bridge(stream, &tx, &cancel).await;

        assert_eq!(outcome, BridgeOutcome::Cancelled { fragments: 0 });
        assert!(cancel.is_cancelled());
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }
}
