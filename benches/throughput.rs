//! Throughput benchmarks

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use serialframe_core::{
    crc16_modbus, decode_payload, encode_frame, FrameDecoder, PayloadRecord, ReaderSource,
    Session, SessionConfig, StreamDecoder, WireFormat,
};
use std::hint::black_box;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

fn telemetry_stream(frames: usize) -> Vec<u8> {
    let records = [
        PayloadRecord::AdcSample {
            sample_count: 1,
            value: 2048,
        },
        PayloadRecord::Temperature { celsius: 31 },
        PayloadRecord::Button {
            button_id: 2,
            button_state: 1,
        },
        PayloadRecord::Text {
            text: "status nominal".to_string(),
        },
    ];

    let mut bytes = Vec::new();
    for i in 0..frames {
        let payload = records[i % records.len()].encode(WireFormat::Packed).unwrap();
        bytes.extend(encode_frame(i as u16, &payload).unwrap());
    }
    bytes
}

fn checksum_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("crc16_modbus_1k", |b| {
        b.iter(|| black_box(crc16_modbus(black_box(&data))))
    });

    group.finish();
}

fn decode_benchmark(c: &mut Criterion) {
    let stream = telemetry_stream(1000);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("frame_decoder_bulk", |b| {
        b.iter_batched(
            FrameDecoder::new,
            |mut decoder| {
                decoder.push(black_box(&stream));
                let mut frames = 0;
                while decoder.next_frame().frame.is_some() {
                    frames += 1;
                }
                black_box(frames)
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("stream_decoder_chunks_of_16", |b| {
        b.iter(|| {
            let mut decoder = StreamDecoder::new(WireFormat::Packed);
            let mut events = 0;
            for chunk in stream.chunks(16) {
                events += decoder.push(black_box(chunk)).len();
            }
            black_box(events)
        })
    });

    group.bench_function("decode_payload_adc", |b| {
        let payload = [3, 1, 0, 0, 0, 0x00, 0x08];
        b.iter(|| black_box(decode_payload(black_box(&payload), WireFormat::Packed)))
    });

    group.finish();
}

fn session_benchmark(c: &mut Criterion) {
    let stream = telemetry_stream(1000);
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("session");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("replay_4k_chunks", |b| {
        b.to_async(&runtime).iter(|| async {
            let source = ReaderSource::new(std::io::Cursor::new(stream.clone()), "bench");
            let mut session = Session::new(
                source,
                SessionConfig {
                    wire_format: WireFormat::Packed,
                    poll_interval: Duration::ZERO,
                },
            );
            let mut sink = |_: &serialframe_core::DecodeEvent| -> anyhow::Result<()> { Ok(()) };
            let stop = AtomicBool::new(false);
            black_box(session.run(&mut sink, &stop).await.unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, checksum_benchmark, decode_benchmark, session_benchmark);
criterion_main!(benches);
