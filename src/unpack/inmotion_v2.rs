//! # InMotion V2 Frame Assembler
//!
//! Second-generation InMotion framing is length-delimited:
//!
//! ```text
//! AA AA | escaped(flags | len | command | data) | checksum
//! ```
//!
//! `len` counts the command byte plus the data bytes. The `0xA5` escape rule
//! covers `{0xAA, 0xA5}` inside the inner region; the trailing checksum (XOR
//! of the decoded inner bytes) travels unescaped. The assembler hands the
//! decoded inner region `[flags, len, command, data...]` to the decoder.

use crate::constants::{INMOTION_ESCAPE, INMOTION_SYNC};
use crate::unpack::Unpacker;
use crate::util::logging::{log_frame_hex, LogThrottle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    Idle,
    Flags,
    Length,
    Body,
    Check,
    Done,
}

/// Assembler for escape-framed InMotion V2 frames.
#[derive(Debug)]
pub struct InmotionV2Unpacker {
    state: AssemblyState,
    buffer: Vec<u8>,
    prev: Option<u8>,
    escaped: bool,
    last_aa: bool,
    /// Announced body length (command + data).
    len: usize,
    /// Rate limit for discard logging; interference makes these frequent.
    throttle: LogThrottle,
}

impl InmotionV2Unpacker {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: Vec::with_capacity(64),
            prev: None,
            escaped: false,
            last_aa: false,
            len: 0,
            throttle: LogThrottle::per_second(5),
        }
    }

    fn begin_collecting(&mut self) {
        self.buffer.clear();
        self.state = AssemblyState::Flags;
        self.prev = None;
        self.escaped = false;
        self.last_aa = false;
        self.len = 0;
    }

    fn back_to_scan(&mut self, byte: u8) {
        self.buffer.clear();
        self.state = AssemblyState::Idle;
        self.prev = Some(byte);
        self.escaped = false;
        self.last_aa = false;
        self.len = 0;
    }

    /// Escape-aware decode of one inner-region byte. Returns the decoded
    /// byte, or `None` while the escape indicator is pending or a header
    /// resync fired.
    fn decode_inner(&mut self, byte: u8) -> Option<u8> {
        if self.escaped {
            self.escaped = false;
            self.last_aa = false;
            return Some(byte);
        }
        if byte == INMOTION_ESCAPE {
            self.escaped = true;
            self.last_aa = false;
            return None;
        }
        if byte == INMOTION_SYNC {
            if self.last_aa {
                // An unescaped AA AA can only be the next header.
                self.begin_collecting();
                return None;
            }
            self.last_aa = true;
            return Some(byte);
        }
        self.last_aa = false;
        Some(byte)
    }
}

impl Default for InmotionV2Unpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Unpacker for InmotionV2Unpacker {
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
            AssemblyState::Flags => {
                if let Some(flags) = self.decode_inner(byte) {
                    self.buffer.push(flags);
                    self.state = AssemblyState::Length;
                }
                false
            }
            AssemblyState::Length => {
                if let Some(len) = self.decode_inner(byte) {
                    if len == 0 {
                        // The command byte is always counted; zero is corrupt.
                        self.back_to_scan(byte);
                        return false;
                    }
                    self.len = len as usize;
                    self.buffer.push(len);
                    self.state = AssemblyState::Body;
                }
                false
            }
            AssemblyState::Body => {
                if let Some(decoded) = self.decode_inner(byte) {
                    self.buffer.push(decoded);
                    if self.buffer.len() == 2 + self.len {
                        self.state = AssemblyState::Check;
                    }
                }
                false
            }
            AssemblyState::Check => {
                // The checksum byte is not escape-encoded.
                let calculated = self.buffer.iter().fold(0u8, |acc, &b| acc ^ b);
                if calculated != byte {
                    if self.throttle.allow() {
                        log::warn!(
                            "inmotion v2: checksum mismatch, calculated {calculated:#04x} received {byte:#04x}"
                        );
                        log_frame_hex("inmotion v2: discarded body", &self.buffer);
                    }
                    self.back_to_scan(byte);
                    return false;
                }
                self.state = AssemblyState::Done;
                true
            }
        }
    }

    /// Decoded inner region: `[flags, len, command, data...]`.
    fn frame(&self) -> &[u8] {
        &self.buffer
    }

    fn reset(&mut self) {
        self.state = AssemblyState::Idle;
        self.buffer.clear();
        self.prev = None;
        self.escaped = false;
        self.last_aa = false;
        self.len = 0;
    }
}

/// Escape-encode one inner byte into `out` (V2 escapes only AA and A5).
pub(crate) fn escape_into(out: &mut Vec<u8>, byte: u8) {
    if byte == INMOTION_SYNC || byte == INMOTION_ESCAPE {
        out.push(INMOTION_ESCAPE);
    }
    out.push(byte);
}

/// Frame a command: header, escaped inner region, raw XOR checksum.
///
/// This is the outbound path of the protocol; decoders use it to build
/// requests and tests use it to synthesize inbound fixtures.
pub fn frame_command(flags: u8, command: u8, data: &[u8]) -> Vec<u8> {
    let len = (data.len() + 1) as u8;
    let mut out = Vec::with_capacity(data.len() + 8);
    out.push(INMOTION_SYNC);
    out.push(INMOTION_SYNC);
    let mut checksum = 0u8;
    for &b in [flags, len, command].iter().chain(data.iter()) {
        escape_into(&mut out, b);
        checksum ^= b;
    }
    out.push(checksum);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INMOTION_V2_FLAG_DEFAULT, INMOTION_V2_FLAG_INITIAL};

    fn feed(unpacker: &mut InmotionV2Unpacker, data: &[u8]) -> Vec<Vec<u8>> {
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
    fn test_roundtrip() {
        let wire = frame_command(INMOTION_V2_FLAG_DEFAULT, 0x04, &[0x11, 0x22]);
        let mut unpacker = InmotionV2Unpacker::new();
        let frames = feed(&mut unpacker, &wire);
        assert_eq!(frames, vec![vec![0x14, 3, 0x04, 0x11, 0x22]]);
    }

    #[test]
    fn test_escaped_data_roundtrip() {
        let wire = frame_command(INMOTION_V2_FLAG_INITIAL, 0x02, &[0xAA, 0xA5, 0x01]);
        let mut unpacker = InmotionV2Unpacker::new();
        let frames = feed(&mut unpacker, &wire);
        assert_eq!(frames, vec![vec![0x11, 4, 0x02, 0xAA, 0xA5, 0x01]]);
    }

    #[test]
    fn test_checksum_mismatch_discards() {
        let mut wire = frame_command(INMOTION_V2_FLAG_DEFAULT, 0x04, &[0x01]);
        let last = wire.len() - 1;
        wire[last] ^= 0x40;
        let mut unpacker = InmotionV2Unpacker::new();
        assert!(feed(&mut unpacker, &wire).is_empty());

        let frames = feed(&mut unpacker, &frame_command(0x14, 0x04, &[0x01]));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_split_delivery() {
        let wire = frame_command(0x14, 0x20, &[0xAA, 1, 2, 3, 4, 5]);
        for split in 1..wire.len() {
            let mut unpacker = InmotionV2Unpacker::new();
            let mut frames = feed(&mut unpacker, &wire[..split]);
            frames.extend(feed(&mut unpacker, &wire[split..]));
            assert_eq!(frames.len(), 1, "split at {split}");
        }
    }

    #[test]
    fn test_zero_length_rejected() {
        let wire = [0xAA, 0xAA, 0x14, 0x00, 0x14];
        let mut unpacker = InmotionV2Unpacker::new();
        assert!(feed(&mut unpacker, &wire).is_empty());
    }
}
