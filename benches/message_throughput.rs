//! Paired transport benchmark suite.
//!
//! Benchmarks the connection lifecycle and message delivery:
//! - Pair setup: connect, open both sides, close
//! - Throughput: messages per pair at different batch sizes
//! - Fan-in: many initiators against one listener
//!
//! Run with: cargo bench --bench message_throughput
//! Results saved to: target/criterion/

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::future::join_all;
use message_endpoint::{
    ChannelSink, ChannelTarget, Completion, Connection, Endpoint, Listener,
    ListenerConfiguration, PairedConnectionFactory, SinkEvent,
};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[100, 1_000, 10_000];
const INITIATOR_COUNTS: &[usize] = &[10, 100];
const PAYLOAD: &[u8] = &[0x5a; 256];

// ============================================================================
// Benchmark: Pair Setup
// ============================================================================

fn bench_pair_setup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("pair_setup", |b| {
        b.to_async(&rt).iter(|| async {
            let (acceptor, initiator, _server, _client) = open_pair().await;
            initiator.close_async(None).await.unwrap();
            drop(acceptor);
        });
    });
}

// ============================================================================
// Benchmark: Throughput
// ============================================================================

fn bench_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("throughput");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("send", batch), &batch, |b, &batch| {
            b.to_async(&rt).iter(|| async move {
                let (_acceptor, initiator, mut server, _client) = open_pair().await;

                for _ in 0..batch {
                    initiator.send(PAYLOAD, Completion::noop());
                }
                drain_messages(&mut server, batch).await;

                initiator.close_async(None).await.unwrap();
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Fan-in
// ============================================================================

fn bench_fan_in(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("fan_in");
    group.sample_size(20);

    for &count in INITIATOR_COUNTS {
        group.bench_with_input(BenchmarkId::new("listener", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async move {
                let (target, mut server) = ChannelTarget::new("bench-db");
                let listener = Listener::new(ListenerConfiguration::new(Arc::new(target)));
                let endpoint =
                    Endpoint::new(listener.clone(), Arc::new(PairedConnectionFactory::new()));

                let initiators: Vec<Connection> =
                    (0..count).map(|_| endpoint.connect().unwrap()).collect();

                let opens = initiators.iter().map(|initiator| {
                    let (sink, events) = ChannelSink::attach(initiator);
                    async move {
                        initiator.open_async(sink).await.unwrap();
                        initiator.send_async(PAYLOAD).await.unwrap();
                        events
                    }
                });
                let _client_events = join_all(opens).await;

                drain_messages(&mut server, count).await;

                let closes = initiators.iter().map(|initiator| initiator.close_async(None));
                join_all(closes).await;
                listener.stop();
            });
        });
    }

    group.finish();
}

// ============================================================================
// Helper Functions
// ============================================================================

type Pair = (
    Connection,
    Connection,
    UnboundedReceiver<SinkEvent>,
    UnboundedReceiver<SinkEvent>,
);

async fn open_pair() -> Pair {
    let acceptor = Connection::acceptor("bench-server");
    let initiator = Endpoint::new(acceptor.clone(), Arc::new(PairedConnectionFactory::new()))
        .connect()
        .unwrap();

    let (server_sink, server) = ChannelSink::attach(&acceptor);
    let (client_sink, client) = ChannelSink::attach(&initiator);
    acceptor.open_async(server_sink).await.unwrap();
    initiator.open_async(client_sink).await.unwrap();

    (acceptor, initiator, server, client)
}

async fn drain_messages(events: &mut UnboundedReceiver<SinkEvent>, count: usize) {
    let mut received = 0;
    while received < count {
        match events.recv().await {
            Some(SinkEvent::Received { .. }) => received += 1,
            Some(SinkEvent::Closed { .. }) | None => break,
        }
    }
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_pair_setup, bench_throughput, bench_fan_in);
criterion_main!(benches);
