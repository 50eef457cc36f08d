//! Protocol encoding/decoding benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wirebus_protocol::{frame, Decoder, Message, Payload};

fn test_request(value_size: usize) -> Message {
    Message::request(
        1,
        "apply",
        Payload::new()
            .with("instance", "i-12345")
            .with("event", "PROCESS")
            .with("data", "x".repeat(value_size)),
    )
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let msg = test_request(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &msg, |b, msg| {
            b.iter(|| black_box(frame::encode(msg).unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let encoded = frame::encode(&test_request(size)).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = BytesMut::from(&encoded[..]);
                black_box(frame::decode(&mut buf).unwrap().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_streaming_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_decode");

    // A batch of frames fed through the decoder in chunks, the way the read
    // loop sees them.
    let mut wire = Vec::new();
    for request_id in 0..64u64 {
        let msg = Message::request(request_id, "echo", Payload::new().with("name", "BBT"));
        wire.extend_from_slice(&frame::encode(&msg).unwrap());
    }

    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("64_frames_in_chunks", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            let mut count = 0;
            for chunk in wire.chunks(1500) {
                decoder.extend(chunk);
                while let Some(msg) = decoder.next_message().unwrap() {
                    black_box(msg);
                    count += 1;
                }
            }
            assert_eq!(count, 64);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_streaming_decode
);
criterion_main!(benches);
