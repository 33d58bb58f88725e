use std::hint::black_box;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gatemesh::Message;

fn sample(
    payload_len: usize,
    props: usize,
) -> Message {
    let mut builder = Message::builder().payload(vec![0xAB; payload_len]);
    for i in 0..props {
        builder = builder.property(format!("key-{i}"), format!("value-{i}"));
    }
    builder.build()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_encode");
    for len in [16usize, 1024, 64 * 1024] {
        let msg = sample(len, 8);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &msg, |b, msg| {
            b.iter(|| black_box(msg.to_bytes().unwrap()))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_decode");
    for len in [16usize, 1024, 64 * 1024] {
        let frame: Bytes = sample(len, 8).to_bytes().unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &frame, |b, frame| {
            b.iter(|| black_box(Message::from_bytes(frame).unwrap()))
        });
    }
    group.finish();
}

fn bench_clone_vs_deep_clone(c: &mut Criterion) {
    let msg = sample(4096, 8);
    c.bench_function("message_clone_shared", |b| {
        b.iter(|| black_box(msg.clone()))
    });
    c.bench_function("message_deep_clone", |b| {
        b.iter(|| black_box(msg.deep_clone()))
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_clone_vs_deep_clone
);
criterion_main!(benches);
