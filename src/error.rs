//! # EUC Decoder Error Handling
//!
//! This module defines the EucError enum, which represents the different error
//! types that can occur in the euc-rs crate.
//!
//! Frame-level problems (bad header, checksum mismatch, truncated run) are
//! deliberately NOT surfaced out of `decode`: a decoder discards the frame,
//! resets its unpacker and keeps scanning. `EucError` is the public error type
//! for the hex utilities, outbound command builders and the decoder factory.

/// Represents the different error types that can occur in the EUC crate.
#[derive(Debug, thiserror::Error)]
pub enum EucError {
    /// Indicates an error when assembling or parsing a protocol frame.
    #[error("Error parsing frame: {0}")]
    FrameParseError(String),

    /// Indicates a checksum mismatch.
    #[error("Invalid checksum: expected {expected:#06x}, calculated {calculated:#06x}")]
    InvalidChecksum { expected: u32, calculated: u32 },

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,

    /// Indicates a wheel type with no registered decoder.
    #[error("Unsupported wheel type: {0}")]
    UnsupportedWheelType(String),

    /// Indicates a semantic command the target decoder cannot express.
    #[error("Command not supported by this protocol: {0}")]
    UnsupportedCommand(String),

    /// Indicates an out-of-range value passed to a command builder.
    #[error("Command value out of range: {0}")]
    CommandValueOutOfRange(String),

    /// A catch‑all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}
