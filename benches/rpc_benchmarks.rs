//! Benchmarks for the framing layer's hot paths: buffer growth, message
//! encode/decode, streaming parse, and zstd compress/decompress at a range
//! of payload sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use msgpack_rpc::buffer::Buffer;
use msgpack_rpc::codec::zstd_codec::{ZstdCodec, ZstdStreamingCompressor, ZstdStreamingParser};
use msgpack_rpc::codec::{NonStreamingCodec, StreamingCompressor, StreamingParser as CodecStreamingParser};
use msgpack_rpc::message::{pack_notification, pack_request, pack_response, Message};
use msgpack_rpc::parser::StreamingParser;
use rmpv::Value;
use std::time::Duration;

fn echo_params(size: usize) -> Vec<Value> {
    vec![Value::from("A".repeat(size))]
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("extend_from_slice_1kb", |b| {
        let chunk = vec![0u8; 1024];
        b.iter(|| {
            let mut buf = Buffer::new();
            buf.extend_from_slice(black_box(&chunk));
            buf
        })
    });

    group.bench_function("prepare_region_then_consume", |b| {
        b.iter(|| {
            let mut buf = Buffer::with_capacity(4096);
            let region = buf.prepare_region(0, 1024);
            region[0] = 1;
            buf.consume(512);
            buf
        })
    });

    group.finish();
}

fn bench_message_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_pack");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[8usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::new("pack_request", size), &size, |b, &size| {
            b.iter(|| pack_request(black_box(1), "echo", echo_params(size)))
        });

        group.bench_with_input(
            BenchmarkId::new("pack_notification", size),
            &size,
            |b, &size| b.iter(|| pack_notification("echo", echo_params(size))),
        );
    }

    group.bench_function("pack_response", |b| {
        b.iter(|| pack_response(black_box(1), Value::Nil, Value::from("abc")))
    });

    group.finish();
}

fn bench_message_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_decode");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[8usize, 64, 1024] {
        let raw = pack_request(1, "echo", echo_params(size));
        group.bench_with_input(BenchmarkId::new("request", size), &size, |b, _| {
            b.iter(|| Message::decode(black_box(raw.clone())).unwrap())
        });
    }

    group.finish();
}

fn bench_streaming_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_parser");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[64usize, 4096] {
        let raw = pack_request(1, "echo", echo_params(size));
        group.bench_with_input(BenchmarkId::new("whole_message", size), &size, |b, _| {
            b.iter(|| {
                let mut parser = StreamingParser::new();
                let dst = parser.prepare_buffer(raw.len());
                dst.copy_from_slice(black_box(&raw));
                assert!(parser.parse_next(raw.len()).unwrap());
                parser.get()
            })
        });

        group.bench_with_input(BenchmarkId::new("byte_at_a_time", size), &size, |b, _| {
            b.iter(|| {
                let mut parser = StreamingParser::new();
                let mut complete = false;
                for &byte in raw.iter() {
                    let dst = parser.prepare_buffer(1);
                    dst[0] = byte;
                    complete = parser.parse_next(1).unwrap();
                }
                assert!(complete);
                parser.get()
            })
        });
    }

    group.finish();
}

fn bench_zstd_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("zstd_non_streaming");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[1024usize, 64 * 1024, 1024 * 1024] {
        let payload = vec![b'A'; size];
        let codec = ZstdCodec::new(3).unwrap();
        let compressed = codec.compress(&payload).unwrap();

        group.bench_with_input(BenchmarkId::new("compress", size), &size, |b, _| {
            b.iter(|| codec.compress(black_box(&payload)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("decompress", size), &size, |b, _| {
            b.iter(|| codec.decompress(black_box(&compressed)).unwrap())
        });
    }

    group.finish();
}

fn bench_zstd_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("zstd_streaming");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[1024usize, 64 * 1024] {
        let payload = vec![b'A'; size];

        group.bench_with_input(BenchmarkId::new("compress_frame", size), &size, |b, _| {
            let mut compressor = ZstdStreamingCompressor::new(3);
            b.iter(|| compressor.compress(black_box(&payload)).unwrap())
        });

        let mut compressor = ZstdStreamingCompressor::new(3);
        let frame = compressor.compress(&payload).unwrap();
        group.bench_with_input(BenchmarkId::new("decompress_frame", size), &size, |b, _| {
            b.iter(|| {
                let mut parser = ZstdStreamingParser::new();
                let region = parser.prepare_buffer(frame.len());
                region.copy_from_slice(black_box(&frame));
                assert!(parser.parse_next(frame.len()).unwrap());
                parser.get()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_buffer,
    bench_message_pack,
    bench_message_decode,
    bench_streaming_parser,
    bench_zstd_roundtrip,
    bench_zstd_streaming,
);
criterion_main!(benches);
