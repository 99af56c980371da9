//! Performance benchmarks for a3s-demux
//!
//! Run with: cargo bench

use a3s_demux::transport::memory::{MemoryBiStream, MemoryConnection, MemorySession};
use a3s_demux::{varint, RegistryConfig, SessionId, SessionRegistry};
use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_varint_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint_decode");
    for value in [37u64, 15_293, 494_878_333, varint::MAX] {
        let mut buf = BytesMut::new();
        varint::encode(value, &mut buf).unwrap();
        let encoded = buf.freeze();
        group.bench_function(format!("{} bytes", encoded.len()), |b| {
            b.iter(|| varint::decode(&mut encoded.clone()).unwrap());
        });
    }
    group.finish();
}

fn bench_fast_path_route(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let (registry, conn, _events) = rt.block_on(async {
        let registry = SessionRegistry::new(RegistryConfig::default()).unwrap();
        let conn = MemoryConnection::new();
        let (session, events) = MemorySession::new();
        registry.announce_session(&conn, SessionId(1), session);
        (registry, conn, events)
    });

    c.bench_function("route_stream (established)", |b| {
        b.to_async(&rt).iter(|| async {
            let (stream, _) = MemoryBiStream::new(0);
            registry.route_stream(&conn, SessionId(1), stream)
        });
    });

    rt.block_on(registry.shutdown());
}

fn bench_announce_releases_buffered(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("announce_with_buffered_streams");
    for count in [1u64, 16, 256] {
        group.bench_function(format!("{} streams", count), |b| {
            b.to_async(&rt).iter(|| async {
                let registry = SessionRegistry::new(RegistryConfig::default()).unwrap();
                let conn = MemoryConnection::new();
                for i in 0..count {
                    let (stream, _) = MemoryBiStream::new(i * 4);
                    registry.route_stream(&conn, SessionId(1), stream);
                }
                let (session, mut events) = MemorySession::new();
                registry.announce_session(&conn, SessionId(1), session);
                for _ in 0..count {
                    events.recv().await.unwrap();
                }
                registry.shutdown().await;
            });
        });
    }
    group.finish();
}

fn bench_datagram_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let (registry, conn, mut events) = rt.block_on(async {
        let registry = SessionRegistry::new(RegistryConfig::default()).unwrap();
        let conn = MemoryConnection::new();
        let (session, events) = MemorySession::new();
        registry.announce_session(&conn, SessionId(7), session);
        (registry, conn, events)
    });
    let datagram = Bytes::from_static(b"\x07hello");

    c.bench_function("datagram fan-out", |b| {
        b.iter(|| {
            conn.push_datagram(datagram.clone());
            rt.block_on(events.recv()).unwrap()
        });
    });

    rt.block_on(registry.shutdown());
}

criterion_group!(
    benches,
    bench_varint_decode,
    bench_fast_path_route,
    bench_announce_releases_buffered,
    bench_datagram_fan_out,
);
criterion_main!(benches);
