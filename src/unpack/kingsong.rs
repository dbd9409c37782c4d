//! # Kingsong Frame Assembler
//!
//! Fixed 20-byte frames behind an `AA 55` header. The link layer word-swaps
//! bytes during transfer, but the host hands them over already in this
//! order, so the assembler is a plain scan-and-collect with no internal
//! checksum.

use crate::constants::{KINGSONG_FRAME_LEN, KINGSONG_HEADER_0, KINGSONG_HEADER_1};
use crate::unpack::Unpacker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    Idle,
    Collecting,
    Done,
}

/// Assembler for 20-byte Kingsong frames.
#[derive(Debug)]
pub struct KingsongUnpacker {
    state: AssemblyState,
    buffer: Vec<u8>,
    prev: Option<u8>,
}

impl KingsongUnpacker {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: Vec::with_capacity(KINGSONG_FRAME_LEN),
            prev: None,
        }
    }
}

impl Default for KingsongUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Unpacker for KingsongUnpacker {
    fn add_byte(&mut self, byte: u8) -> bool {
        match self.state {
            AssemblyState::Done => {
                self.reset();
                self.add_byte(byte)
            }
            AssemblyState::Idle => {
                if self.prev == Some(KINGSONG_HEADER_0) && byte == KINGSONG_HEADER_1 {
                    self.buffer.clear();
                    self.buffer.push(KINGSONG_HEADER_0);
                    self.buffer.push(KINGSONG_HEADER_1);
                    self.state = AssemblyState::Collecting;
                    self.prev = None;
                } else {
                    self.prev = Some(byte);
                }
                false
            }
            AssemblyState::Collecting => {
                self.buffer.push(byte);
                if self.buffer.len() == KINGSONG_FRAME_LEN {
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
