//! Dedup cache throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use weft_core::PeerId;
use weft_gossip::{CacheOptions, DedupCache, GossipPacket};

fn keys(count: usize) -> Vec<String> {
    let origin = PeerId::new([7; 32]);
    (0..count)
        .map(|i| DedupCache::key(&origin, &(i as u64).to_le_bytes()))
        .collect()
}

fn bench_check_and_insert(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let mut group = c.benchmark_group("dedup_check_and_insert");
    for size in [100usize, 1_000, 10_000] {
        let keys = keys(size * 2);
        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.iter(|| {
                let mut cache = DedupCache::new(CacheOptions {
                    max_size: size,
                    ..Default::default()
                });
                for key in keys {
                    black_box(cache.check_and_insert(key.clone()));
                }
            });
        });
    }
    group.finish();
}

fn bench_packet_codec(c: &mut Criterion) {
    let packet = GossipPacket {
        seqno: GossipPacket::random_seqno(),
        origin: Some(PeerId::new([1; 32])),
        from: Some(PeerId::new([2; 32])),
        data: vec![0xAB; 1024].into(),
    };
    let encoded = packet.encode();

    c.bench_function("packet_encode_1k", |b| b.iter(|| black_box(packet.encode())));
    c.bench_function("packet_decode_1k", |b| {
        b.iter(|| black_box(GossipPacket::decode(&encoded).unwrap()))
    });
}

criterion_group!(benches, bench_check_and_insert, bench_packet_codec);
criterion_main!(benches);
