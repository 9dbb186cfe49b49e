//! Performance benchmarks for a3s-chat
//!
//! Run with: cargo bench

use a3s_chat::provider::memory::{chat_frame, MemoryChatService, MemoryTransport};
use a3s_chat::{ChatConfig, ChatSession, Envelope};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn agent_message(i: usize) -> serde_json::Value {
    serde_json::json!({
        "Type": "MESSAGE",
        "ParticipantRole": "AGENT",
        "DisplayName": "Alice",
        "Content": format!("message {}", i),
        "ContentType": "text/plain",
    })
}

fn bench_frame_decoding(c: &mut Criterion) {
    let frame = chat_frame("aws/chat", &agent_message(0));

    c.bench_function("Envelope decode", |b| {
        b.iter(|| serde_json::from_str::<Envelope>(&frame).unwrap());
    });

    let envelope: Envelope = serde_json::from_str(&frame).unwrap();
    c.bench_function("ChatContent decode", |b| {
        b.iter(|| envelope.chat_content("aws/chat").unwrap());
    });

    let other = chat_frame("aws/typing", &agent_message(0));
    c.bench_function("Envelope decode (other topic)", |b| {
        b.iter(|| {
            serde_json::from_str::<Envelope>(&other)
                .unwrap()
                .chat_content("aws/chat")
                .unwrap()
        });
    });
}

fn bench_inbound_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("inbound_throughput");
    for count in [10, 100, 1000] {
        group.bench_function(format!("{} frames", count), |b| {
            b.to_async(&rt).iter(|| async {
                let config = ChatConfig {
                    instance_id: "instance".to_string(),
                    contact_flow_id: "flow".to_string(),
                    ..Default::default()
                };
                let transport = Arc::new(MemoryTransport::default());
                let (mut session, _events) = ChatSession::new(
                    Arc::new(config),
                    Arc::new(MemoryChatService::default()),
                    transport.clone(),
                );
                session.start("Ada", "Lovelace").await.unwrap();
                for i in 0..count {
                    transport.push_chat("aws/chat", agent_message(i));
                }
                session.drain_ready()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frame_decoding, bench_inbound_throughput);
criterion_main!(benches);
