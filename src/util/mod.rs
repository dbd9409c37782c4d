//! # Utility Modules
//!
//! This module provides common utility functions and types used throughout
//! the euc-rs crate, including endian-aware byte codecs, CRC routines, hex
//! encoding/decoding, and rate-limited logging patterns.

pub mod codec;
pub mod crc;
pub mod hex;
pub mod logging;

// Re-export commonly used types and functions
pub use codec::{
    be_i16, be_i32, be_u16, be_u32, be_u32_word_swapped, le_i16, le_i32, le_u16, le_u32,
    round_half_away,
};
pub use crc::{crc16_sum, crc32_ieee};
pub use hex::{decode_hex, encode_hex, format_hex_compact, hex_to_bytes};
pub use logging::{log_frame_hex, LogThrottle};
