//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for logging wheel notification runs and for building
//! test frames. Thin wrappers over the `hex` crate with whitespace handling
//! and a panicking `hex_to_bytes` convenience for test fixtures.

use crate::error::EucError;

/// Encode bytes to lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Encode bytes to uppercase hex string.
///
/// Wheel serial numbers are conventionally displayed uppercase.
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode hex string to bytes.
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, EucError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return Err(EucError::InvalidHexString);
    }

    hex::decode(&cleaned).map_err(|_| EucError::InvalidHexString)
}

/// Format hex data for compact display (useful for logs).
///
/// Formats data as "55 aa 00 18" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Helper for creating test data from hex strings.
///
/// Panics on invalid hex (intended for test code only).
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    decode_hex(hex).expect("Invalid hex in test data")
}
