//! Benchmarks for QMQP message packing
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mailtools_common::Message;
use mailtools_qmqp::netstring;

fn create_test_message(body_size: usize, recipients: usize) -> Message {
    Message::builder()
        .body("X".repeat(body_size))
        .return_path("bounces@example.com")
        .recipients((0..recipients).map(|i| format!("user{i}@example.com")))
        .build()
        .unwrap()
}

fn bench_encode_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");

    for (size, desc) in [(1024, "1KB"), (100 * 1024, "100KB"), (1024 * 1024, "1MB")] {
        let message = create_test_message(size, 10);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(desc), &message, |b, message| {
            b.iter(|| netstring::encode_message(black_box(message)).unwrap());
        });
    }

    group.finish();
}

fn bench_decode_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_message");

    for recipients in [1, 100, 1000] {
        let packed = netstring::encode_message(&create_test_message(4096, recipients)).unwrap();
        group.throughput(Throughput::Elements(recipients as u64));
        group.bench_with_input(BenchmarkId::from_parameter(recipients), &packed, |b, packed| {
            b.iter(|| netstring::decode_message(black_box(packed)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode_message, bench_decode_message);
criterion_main!(benches);
