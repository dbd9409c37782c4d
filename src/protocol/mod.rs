//! Per-manufacturer protocol decoders
//!
//! One module per wheel family, each pairing a frame assembler from
//! [`crate::unpack`] with the family's telemetry layout, handshake state
//! machine and outbound command dialect.

pub mod autodetect;
pub mod gotway;
pub mod inmotion;
pub mod inmotion_v2;
pub mod kingsong;
pub mod ninebot;
pub mod ninebot_z;
pub mod veteran;

pub use autodetect::AutoDetectDecoder;
pub use gotway::GotwayDecoder;
pub use inmotion::InmotionV1Decoder;
pub use inmotion_v2::InmotionV2Decoder;
pub use kingsong::KingsongDecoder;
pub use ninebot::NinebotDecoder;
pub use ninebot_z::NinebotZDecoder;
pub use veteran::VeteranDecoder;
