//! Contract properties every decoder must hold: determinism, stream-split
//! resumability, reset idempotence, no-info-no-change, and the derived-field
//! invariants (power consistency, metric distances, exact equality).

use proptest::prelude::*;

use euc_rs::util::hex::hex_to_bytes;
use euc_rs::{
    create_decoder, supported_types, DecoderConfig, DecoderRegistry, WheelDecoder, WheelState,
    WheelType,
};

const VETERAN_RUN: &str =
    "DC5A5C2025D600003BF500003BF50000FFDE13990DEF0000024602460000000000000000";

fn gotway_run() -> Vec<u8> {
    let mut frame = vec![0x55, 0xAA];
    frame.extend_from_slice(&6000u16.to_be_bytes());
    frame.extend_from_slice(&(-1111i16).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&3231u16.to_be_bytes());
    frame.extend_from_slice(&(-8322i16).to_be_bytes());
    frame.extend_from_slice(&99i16.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame.push(0x00);
    frame.push(0x18);
    frame.extend_from_slice(&[0x5A; 4]);
    frame
}

fn kingsong_run() -> Vec<u8> {
    let mut frame = vec![0u8; 20];
    frame[0] = 0xAA;
    frame[1] = 0x55;
    frame[2..4].copy_from_slice(&6700u16.to_le_bytes());
    frame[4..6].copy_from_slice(&1500u16.to_le_bytes());
    frame[10..12].copy_from_slice(&320i16.to_le_bytes());
    frame[16] = 0xA9;
    frame[17] = 0x14;
    frame[18] = 0x5A;
    frame[19] = 0x5A;
    frame
}

/// Decode one stream in a single call, returning the final snapshot.
fn decode_stream(wheel_type: WheelType, chunks: &[&[u8]]) -> WheelState {
    let mut decoder = create_decoder(wheel_type).unwrap();
    let config = DecoderConfig::default();
    let mut state = WheelState::default();
    for chunk in chunks {
        if let Some(result) = decoder.decode(chunk, &state, &config) {
            state = result.state;
        }
    }
    state
}

#[test]
fn test_determinism_across_equal_decoders() {
    for (wheel_type, run) in [
        (WheelType::Gotway, gotway_run()),
        (WheelType::Veteran, hex_to_bytes(VETERAN_RUN)),
        (WheelType::Kingsong, kingsong_run()),
    ] {
        let a = decode_stream(wheel_type, &[&run]);
        let b = decode_stream(wheel_type, &[&run]);
        assert_eq!(a, b, "{wheel_type:?} decoders with equal state diverged");
    }
}

#[test]
fn test_reset_idempotence() {
    for wheel_type in supported_types() {
        let mut decoder = create_decoder(wheel_type).unwrap();
        decoder.decode(&gotway_run(), &WheelState::default(), &DecoderConfig::default());
        decoder.reset();
        let ready_once = decoder.is_ready();
        decoder.reset();
        assert_eq!(decoder.is_ready(), ready_once, "{wheel_type:?}");
        assert!(!decoder.is_ready(), "{wheel_type:?} still ready after reset");
    }
}

#[test]
fn test_no_info_no_change() {
    // A run with no complete valid frame must not produce a snapshot.
    for wheel_type in supported_types() {
        let mut decoder = create_decoder(wheel_type).unwrap();
        let result = decoder.decode(
            &[0x00, 0x01, 0x02, 0x03, 0x99],
            &WheelState::default(),
            &DecoderConfig::default(),
        );
        assert!(result.is_none(), "{wheel_type:?} invented data from noise");
    }
}

#[test]
fn test_power_consistency() {
    let state = decode_stream(WheelType::Kingsong, &[&kingsong_run()]);
    let derived = (state.current as f64 / 100.0 * state.voltage as f64).round() as i32;
    assert!((state.power - derived).abs() <= 1);

    let state = decode_stream(WheelType::Veteran, &[&hex_to_bytes(VETERAN_RUN)]);
    let derived = (state.current as f64 / 100.0 * state.voltage as f64).round() as i32;
    assert!((state.power - derived).abs() <= 1);
}

#[test]
fn test_distances_are_metric_even_in_miles_mode() {
    // Gotway totals frame with the miles bit set: distances still meters.
    let mut totals = vec![0x55, 0xAA];
    totals.extend_from_slice(&160_934u32.to_be_bytes()); // raw odometer
    totals.extend_from_slice(&1u16.to_be_bytes()); // settings: miles bit
    totals.extend_from_slice(&[0; 10]);
    totals.push(0x04);
    totals.push(0x18);
    totals.extend_from_slice(&[0x5A; 4]);

    let mut decoder = create_decoder(WheelType::Gotway).unwrap();
    let result = decoder
        .decode(&totals, &WheelState::default(), &DecoderConfig::default())
        .unwrap();
    assert!(result.state.in_miles);
    // 160934 wheel-units / 0.62137... = 258998 m: normalized to metric.
    assert_eq!(result.state.total_distance, 258_998);
}

#[test]
fn test_gotway_commands_never_alias_frames() {
    // Outbound Gotway commands are bare ASCII bytes (plus the cutout-angle
    // triple); none of them may assemble into a frame if echoed back.
    use euc_rs::{GotwayUnpacker, Unpacker, WheelAction};

    let decoder = create_decoder(WheelType::Gotway).unwrap();
    let config = DecoderConfig::default();
    let actions = [
        WheelAction::Beep,
        WheelAction::LightOn,
        WheelAction::LightOff,
        WheelAction::LightStrobe,
        WheelAction::PedalsMode(1),
        WheelAction::Miles(true),
        WheelAction::RollAngleMode(0),
        WheelAction::Calibrate,
        WheelAction::SetMaxSpeed(45),
        WheelAction::SetCutoutAngle(300),
    ];

    let mut unpacker = GotwayUnpacker::new();
    for action in &actions {
        for command in decoder.build_command(action, &config) {
            for &byte in command.bytes() {
                assert!(
                    !unpacker.add_byte(byte),
                    "command bytes for {action:?} assembled into a frame"
                );
            }
        }
    }
}

#[test]
fn test_keep_alive_cadences() {
    let cadences = [
        (WheelType::Gotway, 0),
        (WheelType::Veteran, 0),
        (WheelType::Kingsong, 0),
        (WheelType::InmotionV1, 250),
        (WheelType::InmotionV2, 25),
        (WheelType::Ninebot, 125),
        (WheelType::NinebotZ, 25),
    ];
    for (wheel_type, expected) in cadences {
        let decoder = create_decoder(wheel_type).unwrap();
        assert_eq!(decoder.keep_alive_interval_ms(), expected, "{wheel_type:?}");
        assert_eq!(
            decoder.keep_alive_command(&DecoderConfig::default()).is_some(),
            expected != 0,
            "{wheel_type:?}"
        );
    }
}

#[test]
fn test_registry_caches_and_clears() {
    let registry = DecoderRegistry::new();
    let shared = registry.get(WheelType::NinebotZ).unwrap();
    {
        let mut decoder = shared.lock().unwrap();
        decoder.decode(&[0x5A, 0xA5], &WheelState::default(), &DecoderConfig::default());
    }
    assert_eq!(registry.len(), 1);
    registry.clear_cache();
    assert!(registry.is_empty());
}

#[test]
fn test_snapshot_serde_roundtrip() {
    let state = decode_stream(WheelType::Veteran, &[&hex_to_bytes(VETERAN_RUN)]);
    let json = serde_json::to_string(&state).unwrap();
    let back: WheelState = serde_json::from_str(&json).unwrap();
    assert_eq!(state, back);
}

proptest! {
    /// Splitting a stream at any boundary yields the same final snapshot.
    #[test]
    fn prop_resumability_gotway(split in 0usize..24) {
        let run = gotway_run();
        let whole = decode_stream(WheelType::Gotway, &[&run]);
        let halves = decode_stream(WheelType::Gotway, &[&run[..split], &run[split..]]);
        prop_assert_eq!(whole, halves);
    }

    #[test]
    fn prop_resumability_veteran(split in 0usize..36) {
        let run = hex_to_bytes(VETERAN_RUN);
        let whole = decode_stream(WheelType::Veteran, &[&run]);
        let halves = decode_stream(WheelType::Veteran, &[&run[..split], &run[split..]]);
        prop_assert_eq!(whole, halves);
    }

    /// Random leading noise never prevents decoding the frame behind it,
    /// as long as the noise cannot alias a header.
    #[test]
    fn prop_noise_prefix_kingsong(noise in proptest::collection::vec(0u8..0xAA, 0..64)) {
        let mut run = noise;
        run.push(0x00); // break any half-started header before the real one
        run.extend_from_slice(&kingsong_run());
        let state = decode_stream(WheelType::Kingsong, &[&run]);
        prop_assert_eq!(state.voltage, 6700);
    }

    /// No byte sequence panics any decoder.
    #[test]
    fn prop_no_panic_on_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        for wheel_type in supported_types() {
            let mut decoder = create_decoder(wheel_type).unwrap();
            let _ = decoder.decode(&data, &WheelState::default(), &DecoderConfig::default());
        }
    }
}
