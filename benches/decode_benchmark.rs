use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use euc_rs::util::crc::{crc16_sum, crc32_ieee};
use euc_rs::{create_decoder, DecoderConfig, WheelDecoder, WheelState, WheelType};

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0))
        .collect()
}

// Test data samples
const VETERAN_FRAME_HEX: &str =
    "DC5A5C2025D600003BF500003BF50000FFDE13990DEF0000024602460000000000000000";

fn gotway_live_frame() -> Vec<u8> {
    let mut frame = vec![0x55, 0xAA];
    frame.extend_from_slice(&6000u16.to_be_bytes());
    frame.extend_from_slice(&1111i16.to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&3231u16.to_be_bytes());
    frame.extend_from_slice(&832i16.to_be_bytes());
    frame.extend_from_slice(&99i16.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame.push(0x00);
    frame.push(0x18);
    frame.extend_from_slice(&[0x5A; 4]);
    frame
}

fn benchmark_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");
    group.measurement_time(Duration::from_secs(10));
    group.warm_up_time(Duration::from_secs(3));

    let gotway_data = gotway_live_frame();
    group.bench_function("gotway_live_frame", |b| {
        let mut decoder = create_decoder(WheelType::Gotway).unwrap();
        let config = DecoderConfig::default();
        let state = WheelState::default();
        b.iter(|| {
            let _ = decoder.decode(black_box(&gotway_data), &state, &config);
        })
    });

    let veteran_data = hex_to_bytes(VETERAN_FRAME_HEX);
    group.bench_function("veteran_frame", |b| {
        let mut decoder = create_decoder(WheelType::Veteran).unwrap();
        let config = DecoderConfig::default();
        let state = WheelState::default();
        b.iter(|| {
            let _ = decoder.decode(black_box(&veteran_data), &state, &config);
        })
    });

    // Fragmented delivery: one byte per decode call, worst case for the
    // assembler state machines.
    group.bench_function("gotway_byte_by_byte", |b| {
        let mut decoder = create_decoder(WheelType::Gotway).unwrap();
        let config = DecoderConfig::default();
        let state = WheelState::default();
        b.iter(|| {
            for &byte in &gotway_data {
                let _ = decoder.decode(black_box(&[byte]), &state, &config);
            }
        })
    });

    group.finish();
}

fn benchmark_checksums(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksums");
    let payload = vec![0xA5u8; 256];

    group.bench_function("crc16_sum_256", |b| {
        b.iter(|| crc16_sum(black_box(&payload)))
    });
    group.bench_function("crc32_ieee_256", |b| {
        b.iter(|| crc32_ieee(black_box(&payload)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_decoding, benchmark_checksums);
criterion_main!(benches);
