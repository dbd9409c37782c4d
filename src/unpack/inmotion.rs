//! # InMotion V1 Frame Assembler
//!
//! InMotion's first-generation wheels wrap CAN records in:
//!
//! ```text
//! AA AA | escaped payload | CHK | 55 55
//! ```
//!
//! `0xA5` inside the payload region is an escape indicator: the byte after
//! it is taken verbatim, which is how literal `0xAA`, `0x55` and `0xA5`
//! survive inside the payload. The checksum (sum of decoded payload bytes
//! mod 256) travels inside the escaped region; the assembler verifies it
//! and hands the *decoded, checksum-stripped* payload to the decoder.

use crate::constants::{INMOTION_ESCAPE, INMOTION_SYNC, INMOTION_V1_TAIL};
use crate::unpack::Unpacker;
use crate::util::logging::{log_frame_hex, LogThrottle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    Idle,
    Collecting,
    Done,
}

/// Assembler for escape-framed InMotion V1 frames.
#[derive(Debug)]
pub struct InmotionV1Unpacker {
    state: AssemblyState,
    buffer: Vec<u8>,
    prev: Option<u8>,
    /// Previous byte was the 0xA5 escape indicator.
    escaped: bool,
    /// An unescaped 0x55 has been seen; the next byte decides tail vs corrupt.
    pending_tail: bool,
    /// Previous decoded-path byte was an unescaped 0xAA (header resync).
    last_aa: bool,
    /// Rate limit for discard logging; interference makes these frequent.
    throttle: LogThrottle,
}

impl InmotionV1Unpacker {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: Vec::with_capacity(64),
            prev: None,
            escaped: false,
            pending_tail: false,
            last_aa: false,
            throttle: LogThrottle::per_second(5),
        }
    }

    fn begin_collecting(&mut self) {
        self.buffer.clear();
        self.state = AssemblyState::Collecting;
        self.prev = None;
        self.escaped = false;
        self.pending_tail = false;
        self.last_aa = false;
    }

    fn back_to_scan(&mut self, byte: u8) {
        self.buffer.clear();
        self.state = AssemblyState::Idle;
        self.prev = Some(byte);
        self.escaped = false;
        self.pending_tail = false;
        self.last_aa = false;
    }
}

impl Default for InmotionV1Unpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Unpacker for InmotionV1Unpacker {
    fn add_byte(&mut self, byte: u8) -> bool {
        match self.state {
            AssemblyState::Done => {
                self.reset();
                self.add_byte(byte)
            }
            AssemblyState::Idle => {
                if self.prev == Some(INMOTION_SYNC) && byte == INMOTION_SYNC {
                    self.begin_collecting();
                } else {
                    self.prev = Some(byte);
                }
                false
            }
            AssemblyState::Collecting => {
                if self.escaped {
                    self.buffer.push(byte);
                    self.escaped = false;
                    self.last_aa = false;
                    return false;
                }

                if self.pending_tail {
                    if byte == INMOTION_V1_TAIL {
                        // Tail complete. Last decoded byte is the checksum.
                        let Some((&checksum, payload)) = self.buffer.split_last() else {
                            self.back_to_scan(byte);
                            return false;
                        };
                        let sum = payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
                        if sum != checksum {
                            if self.throttle.allow() {
                                log::warn!(
                                    "inmotion: checksum mismatch, calculated {sum:#04x} received {checksum:#04x}"
                                );
                                log_frame_hex("inmotion: discarded payload", &self.buffer);
                            }
                            self.back_to_scan(byte);
                            return false;
                        }
                        self.buffer.pop();
                        self.state = AssemblyState::Done;
                        return true;
                    }
                    // Lone unescaped 0x55 inside the payload: corrupt run.
                    if self.throttle.allow() {
                        log::debug!("inmotion: dangling tail byte, rescanning");
                    }
                    self.back_to_scan(byte);
                    return false;
                }

                if byte == INMOTION_ESCAPE {
                    self.escaped = true;
                    self.last_aa = false;
                    return false;
                }
                if byte == INMOTION_V1_TAIL {
                    self.pending_tail = true;
                    self.last_aa = false;
                    return false;
                }
                if byte == INMOTION_SYNC && self.last_aa {
                    // An unescaped AA AA can only be the next header.
                    self.buffer.clear();
                    self.begin_collecting();
                    return false;
                }

                self.last_aa = byte == INMOTION_SYNC;
                self.buffer.push(byte);
                false
            }
        }
    }

    /// Decoded payload with the checksum stripped.
    fn frame(&self) -> &[u8] {
        &self.buffer
    }

    fn reset(&mut self) {
        self.state = AssemblyState::Idle;
        self.buffer.clear();
        self.prev = None;
        self.escaped = false;
        self.pending_tail = false;
        self.last_aa = false;
    }
}

/// Escape-encode one payload byte into `out`.
pub(crate) fn escape_into(out: &mut Vec<u8>, byte: u8) {
    if byte == INMOTION_SYNC || byte == INMOTION_V1_TAIL || byte == INMOTION_ESCAPE {
        out.push(INMOTION_ESCAPE);
    }
    out.push(byte);
}

/// Frame a decoded payload: header, escaped payload + checksum, tail.
///
/// This is the outbound path of the protocol; decoders use it to build
/// command frames and tests use it to synthesize inbound fixtures.
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.push(INMOTION_SYNC);
    out.push(INMOTION_SYNC);
    for &b in payload {
        escape_into(&mut out, b);
    }
    let checksum = payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    escape_into(&mut out, checksum);
    out.push(INMOTION_V1_TAIL);
    out.push(INMOTION_V1_TAIL);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(unpacker: &mut InmotionV1Unpacker, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in data {
            if unpacker.add_byte(b) {
                frames.push(unpacker.frame().to_vec());
                unpacker.reset();
            }
        }
        frames
    }

    #[test]
    fn test_plain_payload_roundtrip() {
        let payload = vec![0x01, 0x02, 0x03, 0x04];
        let mut unpacker = InmotionV1Unpacker::new();
        let frames = feed(&mut unpacker, &frame_payload(&payload));
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn test_escaped_bytes_roundtrip() {
        // Every byte that needs escaping, plus a checksum that lands on 0x55.
        let payload = vec![0xAA, 0x55, 0xA5, 0x01];
        let wire = frame_payload(&payload);
        // 3 escapes in payload, checksum 0xA5 (0xAA+0x55+0xA5+0x01) escaped too
        assert!(wire.len() > payload.len() + 5);
        let mut unpacker = InmotionV1Unpacker::new();
        let frames = feed(&mut unpacker, &wire);
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn test_checksum_mismatch_discards() {
        let payload = vec![0x01, 0x02, 0x03];
        let mut wire = frame_payload(&payload);
        wire[4] ^= 0x01; // corrupt a payload byte, checksum now wrong
        let mut unpacker = InmotionV1Unpacker::new();
        assert!(feed(&mut unpacker, &wire).is_empty());

        // Still recovers on the next clean frame.
        let frames = feed(&mut unpacker, &frame_payload(&payload));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_split_delivery() {
        let payload: Vec<u8> = (0..20).collect();
        let wire = frame_payload(&payload);
        for split in 1..wire.len() {
            let mut unpacker = InmotionV1Unpacker::new();
            let mut frames = feed(&mut unpacker, &wire[..split]);
            frames.extend(feed(&mut unpacker, &wire[split..]));
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0], payload);
        }
    }

    #[test]
    fn test_header_resync_mid_frame() {
        // A truncated frame followed by a complete one.
        let mut wire = vec![0xAA, 0xAA, 0x01, 0x02];
        wire.extend_from_slice(&frame_payload(&[0x09, 0x08]));
        let mut unpacker = InmotionV1Unpacker::new();
        let frames = feed(&mut unpacker, &wire);
        assert_eq!(frames, vec![vec![0x09, 0x08]]);
    }
}
