//! # Veteran Frame Assembler
//!
//! Veteran/Leaperkim boards frame as:
//!
//! ```text
//! DC 5A 5C | len | data[len] | [CRC-32 LE]
//! ```
//!
//! The CRC-32 (reflected IEEE over the `len` data bytes) is present when
//! `len > 38` or once any frame has verified under CRC mode; newer boards
//! append it on every frame, so a single success latches checking on even
//! for short frames. Three data-sanity probes reject a corrupt candidate
//! early, at the moment the probed byte arrives, instead of waiting for the
//! full length.

use crate::constants::{VETERAN_CRC_LEN_THRESHOLD, VETERAN_HEADER, VETERAN_MAX_PAYLOAD};
use crate::unpack::Unpacker;
use crate::util::codec::le_u32;
use crate::util::crc::crc32_ieee;
use crate::util::logging::{log_frame_hex, LogThrottle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    Idle,
    Length,
    Collecting,
    Done,
}

/// Assembler for length-framed Veteran frames with optional CRC-32.
#[derive(Debug)]
pub struct VeteranUnpacker {
    state: AssemblyState,
    buffer: Vec<u8>,
    /// Last two bytes seen while scanning for the 3-byte header.
    old1: Option<u8>,
    old2: Option<u8>,
    /// Announced payload length.
    len: usize,
    /// A CRC-32 frame has verified; all later frames must carry one.
    crc_latched: bool,
    /// Rate limit for discard logging; interference makes these frequent.
    throttle: LogThrottle,
}

impl VeteranUnpacker {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: Vec::with_capacity(64),
            old1: None,
            old2: None,
            len: 0,
            crc_latched: false,
            throttle: LogThrottle::per_second(5),
        }
    }

    /// Whether CRC-32 mode has been latched by a verified frame.
    pub fn crc_latched(&self) -> bool {
        self.crc_latched
    }

    /// Full reset including the CRC latch; used by the owning decoder's
    /// `reset`, not by the per-frame rescan.
    pub fn clear_latch(&mut self) {
        self.crc_latched = false;
    }

    fn expects_crc(&self) -> bool {
        self.crc_latched || self.len > VETERAN_CRC_LEN_THRESHOLD
    }

    fn expected_total(&self) -> usize {
        4 + self.len + if self.expects_crc() { 4 } else { 0 }
    }

    fn back_to_scan(&mut self, byte: u8) {
        self.buffer.clear();
        self.state = AssemblyState::Idle;
        self.old2 = self.old1;
        self.old1 = Some(byte);
    }

    /// Early data-sanity probes at fixed absolute offsets.
    fn probe_fails(&self, index: usize, byte: u8) -> bool {
        match index {
            22 => byte != 0x00,
            23 => byte & 0xFE != 0x00,
            30 => byte != 0x00 && byte != 0x07,
            _ => false,
        }
    }
}

impl Default for VeteranUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Unpacker for VeteranUnpacker {
    fn add_byte(&mut self, byte: u8) -> bool {
        match self.state {
            AssemblyState::Done => {
                self.reset();
                self.add_byte(byte)
            }
            AssemblyState::Idle => {
                if self.old2 == Some(VETERAN_HEADER[0])
                    && self.old1 == Some(VETERAN_HEADER[1])
                    && byte == VETERAN_HEADER[2]
                {
                    self.buffer.clear();
                    self.buffer.extend_from_slice(&VETERAN_HEADER);
                    self.state = AssemblyState::Length;
                    self.old1 = None;
                    self.old2 = None;
                } else {
                    self.old2 = self.old1;
                    self.old1 = Some(byte);
                }
                false
            }
            AssemblyState::Length => {
                if byte as usize > VETERAN_MAX_PAYLOAD {
                    self.back_to_scan(byte);
                    return false;
                }
                self.len = byte as usize;
                self.buffer.push(byte);
                self.state = AssemblyState::Collecting;
                false
            }
            AssemblyState::Collecting => {
                let index = self.buffer.len();
                if index < 4 + self.len && self.probe_fails(index, byte) {
                    if self.throttle.allow() {
                        log::debug!("veteran: sanity probe failed at offset {index}, rescanning");
                    }
                    self.back_to_scan(byte);
                    return false;
                }
                self.buffer.push(byte);

                if self.buffer.len() < self.expected_total() {
                    return false;
                }

                if self.expects_crc() {
                    let calculated = crc32_ieee(&self.buffer[4..4 + self.len]);
                    let received = le_u32(&self.buffer, 4 + self.len);
                    if calculated != received {
                        if self.throttle.allow() {
                            log::warn!(
                                "veteran: CRC-32 mismatch, calculated {calculated:08x} received {received:08x}"
                            );
                            log_frame_hex("veteran: discarded frame", &self.buffer);
                        }
                        self.back_to_scan(byte);
                        return false;
                    }
                    self.crc_latched = true;
                }

                self.state = AssemblyState::Done;
                true
            }
        }
    }

    fn frame(&self) -> &[u8] {
        &self.buffer
    }

    fn reset(&mut self) {
        self.state = AssemblyState::Idle;
        self.buffer.clear();
        self.old1 = None;
        self.old2 = None;
        self.len = 0;
        // crc_latched survives the per-frame reset on purpose.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(unpacker: &mut VeteranUnpacker, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in data {
            if unpacker.add_byte(b) {
                frames.push(unpacker.frame().to_vec());
                unpacker.reset();
            }
        }
        frames
    }

    /// 36-byte Sherman-era frame, no CRC.
    fn short_frame() -> Vec<u8> {
        let mut frame = vec![0xDC, 0x5A, 0x5C, 0x20];
        frame.extend_from_slice(&[0u8; 32]);
        frame
    }

    fn crc_frame(len: u8) -> Vec<u8> {
        let mut frame = vec![0xDC, 0x5A, 0x5C, len];
        let data = vec![0u8; len as usize];
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&crc32_ieee(&data).to_le_bytes());
        frame
    }

    #[test]
    fn test_short_frame_no_crc() {
        let mut unpacker = VeteranUnpacker::new();
        let frames = feed(&mut unpacker, &short_frame());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 36);
        assert!(!unpacker.crc_latched());
    }

    #[test]
    fn test_long_frame_requires_crc() {
        let mut unpacker = VeteranUnpacker::new();
        let frames = feed(&mut unpacker, &crc_frame(56));
        assert_eq!(frames.len(), 1);
        assert!(unpacker.crc_latched());
    }

    #[test]
    fn test_crc_mismatch_discards() {
        let mut bad = crc_frame(56);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let mut unpacker = VeteranUnpacker::new();
        assert!(feed(&mut unpacker, &bad).is_empty());
        assert!(!unpacker.crc_latched());
    }

    #[test]
    fn test_latch_applies_to_short_frames() {
        let mut unpacker = VeteranUnpacker::new();
        assert_eq!(feed(&mut unpacker, &crc_frame(56)).len(), 1);

        // Once latched, a short frame without CRC no longer completes at
        // 36 bytes; it needs (and here gets) a trailing CRC.
        let frames = feed(&mut unpacker, &crc_frame(32));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4 + 32 + 4);
    }

    #[test]
    fn test_sanity_probe_rejects() {
        let mut bad = short_frame();
        bad[22] = 0x55; // must be 0x00
        let mut unpacker = VeteranUnpacker::new();
        assert!(feed(&mut unpacker, &bad).is_empty());

        let mut bad = short_frame();
        bad[30] = 0x01; // must be 0x00 or 0x07
        assert!(feed(&mut unpacker, &bad).is_empty());

        let mut ok = short_frame();
        ok[30] = 0x07;
        ok[23] = 0x01; // low bit allowed
        assert_eq!(feed(&mut unpacker, &ok).len(), 1);
    }

    #[test]
    fn test_split_delivery() {
        let frame = short_frame();
        for split in 1..frame.len() {
            let mut unpacker = VeteranUnpacker::new();
            let mut frames = feed(&mut unpacker, &frame[..split]);
            frames.extend(feed(&mut unpacker, &frame[split..]));
            assert_eq!(frames.len(), 1, "split at {split}");
        }
    }

    #[test]
    fn test_decoder_reset_clears_latch() {
        let mut unpacker = VeteranUnpacker::new();
        feed(&mut unpacker, &crc_frame(56));
        assert!(unpacker.crc_latched());
        unpacker.reset();
        assert!(unpacker.crc_latched(), "per-frame reset keeps the latch");
        unpacker.clear_latch();
        assert!(!unpacker.crc_latched());
    }
}
