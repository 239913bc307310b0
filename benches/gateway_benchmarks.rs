//! Performance benchmarks for the voice chat gateway
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use futures::stream;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use voicechat_gateway::core::asr::messages::parse_response;
use voicechat_gateway::core::asr::{compute_signature, truncate_input};
use voicechat_gateway::core::bridge::{StreamBridge, StreamEvent};
use voicechat_gateway::core::chat::{ChatFragment, ChatMessage, ChatResult, ConversationMemory};
use voicechat_gateway::handlers::chat::to_sse_event;

/// Benchmark request signing over realistic upload sizes
fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("asr_signing");
    group.measurement_time(Duration::from_secs(5));

    for size in [5usize, 16 * 1024, 512 * 1024] {
        let payload = BASE64.encode(vec![0x55u8; size]);

        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::new("truncate", size), &payload, |b, q| {
            b.iter(|| truncate_input(black_box(q)).len());
        });
        group.bench_with_input(BenchmarkId::new("sign", size), &payload, |b, q| {
            b.iter(|| {
                compute_signature(
                    black_box("app-key"),
                    black_box(q),
                    black_box("2b6f3c1e-salt"),
                    black_box("1700000000"),
                    black_box("app-secret"),
                )
            });
        });
    }

    group.finish();
}

/// Benchmark ASR response parsing
fn bench_response_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("asr_response");

    let short = r#"{"errorCode":"0","result":["你好"]}"#.to_string();
    let long = format!(
        r#"{{"errorCode":"0","result":[{}]}}"#,
        vec![r#""今天天气不错，我们出去走走吧。""#; 64].join(",")
    );

    for (name, body) in [("short", &short), ("long", &long)] {
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", name), body, |b, body| {
            b.iter(|| parse_response(black_box(body)));
        });
    }

    group.finish();
}

/// Benchmark SSE event framing
fn bench_sse_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("sse_events");

    let plain = "Hello, this is a streamed fragment. ".repeat(4);
    let multiline = "line one\r\nline two\rline three\n".repeat(4);

    group.bench_function("fragment_plain", |b| {
        b.iter(|| to_sse_event(StreamEvent::Fragment(black_box(plain.clone()))));
    });
    group.bench_function("fragment_multiline", |b| {
        b.iter(|| to_sse_event(StreamEvent::Fragment(black_box(multiline.clone()))));
    });
    group.bench_function("complete", |b| {
        b.iter(|| to_sse_event(black_box(StreamEvent::Complete)));
    });

    group.finish();
}

/// Benchmark conversation memory under a bounded window
fn bench_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversation_memory");

    let memory = ConversationMemory::new(20);
    for i in 0..100 {
        memory.commit_turn(
            &format!("session-{i}"),
            ChatMessage::user("question"),
            ChatMessage::assistant("answer"),
        );
    }

    group.bench_function("commit_turn", |b| {
        b.iter(|| {
            memory.commit_turn(
                black_box("session-hot"),
                ChatMessage::user("what next?"),
                ChatMessage::assistant("keep going"),
            )
        });
    });
    group.bench_function("history", |b| {
        b.iter(|| memory.history(black_box("session-hot")).len());
    });

    group.finish();
}

/// Benchmark fragment relay through the single-slot channel
fn bench_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_bridge");
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let bridge = StreamBridge::default();

    for count in [16usize, 256] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("relay", count), &count, |b, &count| {
            b.to_async(&runtime).iter(|| {
                let bridge = bridge.clone();
                async move {
                    let fragments: Vec<ChatResult<ChatFragment>> = (0..count)
                        .map(|i| Ok(ChatFragment::new(format!("token-{i} "))))
                        .collect();
                    let (tx, mut rx) = mpsc::channel::<StreamEvent>(1);
                    let reader = tokio::spawn(async move {
                        let mut received = 0usize;
                        while rx.recv().await.is_some() {
                            received += 1;
                        }
                        received
                    });

                    let outcome = bridge
                        .bridge(
                            Box::pin(stream::iter(fragments)),
                            &tx,
                            &CancellationToken::new(),
                        )
                        .await;
                    drop(tx);
                    let received = reader.await.unwrap_or_default();
                    black_box((outcome.fragments(), received))
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_signing,
    bench_response_parsing,
    bench_sse_events,
    bench_memory,
    bench_bridge,
);

criterion_main!(benches);
