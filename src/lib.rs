//! # euc-rs - A Rust Crate for Electric Unicycle Telemetry Decoding
//!
//! The euc-rs crate implements stateful protocol decoders for electric
//! unicycle (EUC) wheels that communicate over a short-range wireless link:
//! Gotway/Begode, Veteran/Leaperkim, Kingsong, InMotion (CAN-over-air and
//! the V11-and-later protocol), Ninebot and Ninebot-Z.
//!
//! ## Features
//!
//! - Reassemble frames from arbitrarily-fragmented notification byte runs
//! - Verify footers, sanity bytes, checksums, CRC-32 and XOR-gamma CRCs
//! - Decode telemetry into one immutable, exactly-comparable snapshot type
//! - Drive connection handshakes (identity probes, key exchange, register
//!   walks) and emit the outbound command bytes each protocol expects
//! - Dual smart-BMS accumulation, per-model battery curves, polarity and
//!   unit normalization
//!
//! ## Usage
//!
//! ```rust
//! use euc_rs::{create_decoder, DecoderConfig, WheelDecoder, WheelState, WheelType};
//!
//! let mut decoder = create_decoder(WheelType::Gotway).unwrap();
//! let config = DecoderConfig::default();
//! let mut state = WheelState::default();
//!
//! // Bytes as delivered by the transport, any fragmentation:
//! let chunk: &[u8] = &[0x55, 0xAA];
//! if let Some(decoded) = decoder.decode(chunk, &state, &config) {
//!     state = decoded.state;
//!     for command in &decoded.commands {
//!         // write command.bytes() to the wheel, honoring command.delay_ms()
//!     }
//! }
//! ```
//!
//! Transport (scanning, connecting, GATT writes), storage and UI are the
//! host's business; this crate only turns bytes into snapshots and
//! snapshots' worth of commands into bytes.

pub mod constants;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod telemetry;
pub mod unpack;
pub mod util;

pub use crate::error::EucError;
pub use crate::logging::{init_logger, log_info};

// Decoder contract
pub use decoder::{
    create_decoder, supported_types, DecodedData, DecoderConfig, DecoderRegistry, ManualClock,
    MonotonicClock, NinebotVariant, SystemClock, WheelAction, WheelCommand, WheelDecoder,
    WheelType,
};

// Telemetry model
pub use telemetry::{SmartBms, WheelState};

// Concrete decoders for hosts that want them directly
pub use protocol::{
    AutoDetectDecoder, GotwayDecoder, InmotionV1Decoder, InmotionV2Decoder, KingsongDecoder,
    NinebotDecoder, NinebotZDecoder, VeteranDecoder,
};

// Frame assemblers
pub use unpack::{
    GotwayUnpacker, InmotionV1Unpacker, InmotionV2Unpacker, KingsongUnpacker, NinebotUnpacker,
    Unpacker, VeteranUnpacker,
};
