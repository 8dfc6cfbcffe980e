use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use codespace_collab::broadcast::BroadcastGroup;
use codespace_collab::protocol::{Message, Participant};
use codespace_collab::registry::RoomRegistry;
use codespace_collab::session::Session;
use codespace_collab::STARTING_CODE;
use uuid::Uuid;

fn bench_code_change_encode(c: &mut Criterion) {
    let msg = Message::code(STARTING_CODE);

    c.bench_function("code_change_encode", |b| {
        b.iter(|| black_box(black_box(&msg).encode().unwrap()))
    });
}

fn bench_code_change_decode(c: &mut Criterion) {
    let encoded = Message::code("x".repeat(4096)).encode().unwrap();

    c.bench_function("code_change_decode_4KB", |b| {
        b.iter(|| black_box(Message::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_room_data_encode_50_users(c: &mut Criterion) {
    let users: Vec<Participant> = (0..50)
        .map(|i| Participant::new(Uuid::new_v4(), format!("User{i}")))
        .collect();
    let msg = Message::room_data(users);

    c.bench_function("room_data_encode_50_users", |b| {
        b.iter(|| black_box(msg.encode().unwrap()))
    });
}

fn bench_relay_100_peers(c: &mut Criterion) {
    let group = BroadcastGroup::new(1024);
    let receivers: Vec<_> = (0..100).map(|_| group.subscribe()).collect();
    let origin = Uuid::new_v4();
    let msg = Message::code(STARTING_CODE);

    c.bench_function("relay_100_peers", |b| {
        b.iter(|| black_box(group.relay(black_box(&msg), Some(origin)).unwrap()))
    });
    drop(receivers);
}

fn bench_apply_1000_updates_10_peers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("apply_1000_updates_10_peers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = RoomRegistry::new(2048);
                let mut receivers = Vec::new();
                let origin = Uuid::new_v4();
                registry.join("R1", Participant::new(origin, "Origin")).await.unwrap();
                for i in 0..10 {
                    let peer = Participant::new(Uuid::new_v4(), format!("Peer{i}"));
                    let outcome = registry.join("R1", peer).await.unwrap();
                    receivers.push(outcome.subscription);
                }

                for i in 0..1000u32 {
                    registry
                        .apply_code_change("R1", origin, format!("v{i}"))
                        .await;
                }
                black_box(receivers.len());
            });
        })
    });
}

fn bench_session_inbound_1000(c: &mut Criterion) {
    let frames: Vec<Message> = (0..1000).map(|i| Message::code(format!("v{i}"))).collect();

    c.bench_function("session_inbound_1000", |b| {
        b.iter(|| {
            let mut session = Session::new("R1", "Alice");
            session.join().unwrap();
            session.joined().unwrap();
            for msg in frames.iter().cloned() {
                black_box(session.handle_inbound(msg));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_code_change_encode,
    bench_code_change_decode,
    bench_room_data_encode_50_users,
    bench_relay_100_peers,
    bench_apply_1000_updates_10_peers,
    bench_session_inbound_1000,
);
criterion_main!(benches);
