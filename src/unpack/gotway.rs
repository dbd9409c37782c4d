//! # Gotway Frame Assembler
//!
//! Gotway/Begode boards emit fixed 24-byte frames:
//!
//! ```text
//! 55 AA | 16 payload bytes | frame-type | 18 | 5A 5A 5A 5A
//! ```
//!
//! The four 0x5A footer bytes of one frame can interleave with the header of
//! the next when runs fragment mid-frame, producing two well-known garbage
//! prefixes. Both are recognized mid-collection and the assembler restarts
//! with the later `55 AA` as the real header; this recovery path is the
//! historical bug farm, so it is an explicit state machine with its own
//! tests.

use crate::constants::{GOTWAY_FOOTER, GOTWAY_FRAME_LEN, GOTWAY_HEADER_0, GOTWAY_HEADER_1};
use crate::unpack::Unpacker;
use crate::util::logging::{log_frame_hex, LogThrottle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    Idle,
    Collecting,
    Done,
}

/// Assembler for 24-byte Gotway frames.
#[derive(Debug)]
pub struct GotwayUnpacker {
    state: AssemblyState,
    buffer: Vec<u8>,
    prev: Option<u8>,
    /// Rate limit for discard logging; interference makes these frequent.
    throttle: LogThrottle,
}

impl GotwayUnpacker {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: Vec::with_capacity(GOTWAY_FRAME_LEN),
            prev: None,
            throttle: LogThrottle::per_second(5),
        }
    }

    fn begin_collecting(&mut self) {
        self.buffer.clear();
        self.buffer.push(GOTWAY_HEADER_0);
        self.buffer.push(GOTWAY_HEADER_1);
        self.state = AssemblyState::Collecting;
        self.prev = None;
    }

    fn back_to_scan(&mut self, byte: u8) {
        self.buffer.clear();
        self.state = AssemblyState::Idle;
        // The offending byte may open the next header.
        self.prev = Some(byte);
    }

    /// Footer-of-previous-frame garbage: the real frame starts at the
    /// trailing `55 AA`.
    fn is_garbage_prefix(&self) -> bool {
        matches!(
            self.buffer.as_slice(),
            [0x55, 0xAA, 0x5A, 0x55, 0xAA] | [0x55, 0xAA, 0x5A, 0x5A, 0x55, 0xAA]
        )
    }
}

impl Default for GotwayUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Unpacker for GotwayUnpacker {
    fn add_byte(&mut self, byte: u8) -> bool {
        match self.state {
            AssemblyState::Done => {
                // Owner forgot to reset; start over rather than overrun.
                self.reset();
                self.add_byte(byte)
            }
            AssemblyState::Idle => {
                if self.prev == Some(GOTWAY_HEADER_0) && byte == GOTWAY_HEADER_1 {
                    self.begin_collecting();
                } else {
                    self.prev = Some(byte);
                }
                false
            }
            AssemblyState::Collecting => {
                self.buffer.push(byte);
                let size = self.buffer.len();

                if self.is_garbage_prefix() {
                    if self.throttle.allow() {
                        log::debug!(
                            "gotway: garbage prefix at size {size}, resyncing on inner header"
                        );
                    }
                    self.begin_collecting();
                    return false;
                }

                // 1-based positions 21..24 are the 5A footer run.
                if (21..=GOTWAY_FRAME_LEN).contains(&size) && byte != GOTWAY_FOOTER {
                    if self.throttle.allow() {
                        log::warn!(
                            "gotway: footer byte {byte:#04x} at position {size}, rescanning"
                        );
                        log_frame_hex("gotway: discarded candidate", &self.buffer);
                    }
                    self.back_to_scan(byte);
                    return false;
                }

                if size == GOTWAY_FRAME_LEN {
                    self.state = AssemblyState::Done;
                    return true;
                }
                false
            }
        }
    }

    fn frame(&self) -> &[u8] {
        &self.buffer
    }

    fn reset(&mut self) {
        self.state = AssemblyState::Idle;
        self.buffer.clear();
        self.prev = None;
    }
}
