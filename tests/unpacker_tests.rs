//! Reassembly behavior across all frame assemblers: byte-by-byte delivery,
//! several frames per run, noise between frames, and recovery after corrupt
//! candidates. These exercise the `Unpacker` trait the way a transport
//! delivers real notification runs.

use euc_rs::unpack::inmotion::frame_payload;
use euc_rs::unpack::inmotion_v2::frame_command;
use euc_rs::util::crc::crc32_ieee;
use euc_rs::{
    GotwayUnpacker, InmotionV1Unpacker, InmotionV2Unpacker, KingsongUnpacker, NinebotUnpacker,
    Unpacker, VeteranUnpacker,
};

fn collect_frames(unpacker: &mut dyn Unpacker, data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for &byte in data {
        if unpacker.add_byte(byte) {
            frames.push(unpacker.frame().to_vec());
            unpacker.reset();
        }
    }
    frames
}

fn gotway_frame(frame_type: u8) -> Vec<u8> {
    let mut frame = vec![0x55, 0xAA];
    frame.extend_from_slice(&[0u8; 16]);
    frame.push(frame_type);
    frame.push(0x18);
    frame.extend_from_slice(&[0x5A; 4]);
    frame
}

fn veteran_frame() -> Vec<u8> {
    let mut frame = vec![0xDC, 0x5A, 0x5C, 0x20];
    frame.extend_from_slice(&[0u8; 32]);
    frame
}

fn kingsong_frame() -> Vec<u8> {
    let mut frame = vec![0xAA, 0x55];
    frame.extend_from_slice(&[0u8; 14]);
    frame.extend_from_slice(&[0xA9, 0x14, 0x5A, 0x5A]);
    frame
}

fn ninebot_frame() -> Vec<u8> {
    // Zero gamma, CRC over [len src dst param data]: computed inline.
    let body = [0x02u8, 0x20, 0x3D, 0x01, 0xB0, 0x20];
    let sum: u32 = body.iter().map(|&b| b as u32).sum();
    let crc = ((sum ^ 0xFFFF) & 0xFFFF) as u16;
    let mut frame = vec![0x55, 0xAA];
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

#[test]
fn test_every_unpacker_survives_byte_at_a_time() {
    let cases: Vec<(Box<dyn Unpacker>, Vec<u8>)> = vec![
        (Box::new(GotwayUnpacker::new()), gotway_frame(0x00)),
        (Box::new(VeteranUnpacker::new()), veteran_frame()),
        (Box::new(KingsongUnpacker::new()), kingsong_frame()),
        (
            Box::new(InmotionV1Unpacker::new()),
            frame_payload(&(0u8..20).collect::<Vec<_>>()),
        ),
        (
            Box::new(InmotionV2Unpacker::new()),
            frame_command(0x14, 0x04, &[1, 2, 3]),
        ),
        (Box::new(NinebotUnpacker::new()), ninebot_frame()),
    ];

    for (mut unpacker, wire) in cases {
        let frames = collect_frames(unpacker.as_mut(), &wire);
        assert_eq!(frames.len(), 1, "single frame for {} wire bytes", wire.len());
    }
}

#[test]
fn test_three_frames_in_one_run_with_noise() {
    let mut run = Vec::new();
    for chunk in [
        &[0x00u8, 0x11, 0x5A][..],
        &gotway_frame(0x00),
        &[0xFFu8, 0x55][..],
        &gotway_frame(0x04),
        &[0x01u8][..],
        &gotway_frame(0x00),
    ] {
        run.extend_from_slice(chunk);
    }

    let mut unpacker = GotwayUnpacker::new();
    let frames = collect_frames(&mut unpacker, &run);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1][18], 0x04);
}

#[test]
fn test_interleaved_protocols_do_not_cross_talk() {
    // A Veteran frame passed to the Kingsong assembler (and vice versa)
    // must never complete.
    let mut kingsong = KingsongUnpacker::new();
    assert!(collect_frames(&mut kingsong, &veteran_frame()).is_empty());

    let mut veteran = VeteranUnpacker::new();
    assert!(collect_frames(&mut veteran, &kingsong_frame()).is_empty());
}

#[test]
fn test_veteran_crc_latch_spans_frames() {
    let mut unpacker = VeteranUnpacker::new();

    // Long frame with CRC latches the mode.
    let data = vec![0u8; 56];
    let mut long = vec![0xDC, 0x5A, 0x5C, 56];
    long.extend_from_slice(&data);
    long.extend_from_slice(&crc32_ieee(&data).to_le_bytes());
    assert_eq!(collect_frames(&mut unpacker, &long).len(), 1);
    assert!(unpacker.crc_latched());

    // A legacy short frame without CRC is now held for 4 more bytes and
    // rejected unless they verify.
    let frames = collect_frames(&mut unpacker, &veteran_frame());
    assert!(frames.is_empty());
}

#[test]
fn test_gotway_recovers_after_truncated_frame() {
    // A truncated frame swallows the header of the next one before the
    // footer check fires; the stream resynchronizes on the frame after that.
    let mut run = gotway_frame(0x00)[..10].to_vec(); // truncated
    run.extend_from_slice(&gotway_frame(0x00)); // sacrificed to resync
    run.extend_from_slice(&gotway_frame(0x00)); // assembles intact

    let mut unpacker = GotwayUnpacker::new();
    let frames = collect_frames(&mut unpacker, &run);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], gotway_frame(0x00));
}

#[test]
fn test_inmotion_escape_density_worst_case() {
    // A payload made entirely of escape-needing bytes doubles on the wire
    // and still reassembles exactly.
    let payload = vec![0xAA; 24];
    let wire = frame_payload(&payload);
    assert!(wire.len() >= payload.len() * 2);

    let mut unpacker = InmotionV1Unpacker::new();
    let frames = collect_frames(&mut unpacker, &wire);
    assert_eq!(frames, vec![payload]);
}

#[test]
fn test_ninebot_length_byte_sizes_frame() {
    // Frames with different lengths back to back; the unencrypted length
    // byte alone determines each boundary.
    let mut run = ninebot_frame();
    run.extend_from_slice(&ninebot_frame());

    let mut unpacker = NinebotUnpacker::new();
    let frames = collect_frames(&mut unpacker, &run);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].len(), 10); // 2 data bytes + 8 overhead
}
