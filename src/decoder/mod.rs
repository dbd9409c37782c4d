//! # Decoder Contract and Factory
//!
//! A [`WheelDecoder`] turns arbitrarily-fragmented notification byte runs
//! into immutable [`WheelState`](crate::telemetry::WheelState) snapshots and
//! outbound [`WheelCommand`] batches. One instance per connection; all
//! internal state (assembler buffer, handshake machine, gamma key, BMS
//! accumulators) is private and fully cleared by `reset`.
//!
//! The host side of the contract:
//!
//! - call `decode` with every notification run, passing the previous
//!   snapshot; replace it with `DecodedData::state` when a value returns;
//! - write `DecodedData::commands` to the wheel in order, honoring delays;
//! - send `init_commands` once after connecting, then poll
//!   `keep_alive_command` every `keep_alive_interval_ms` (0 = the protocol
//!   has no keep-alive);
//! - `is_ready` is advisory: a non-ready decoder still publishes telemetry
//!   when a live frame decodes.

pub mod clock;
pub mod command;
pub mod config;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::telemetry::WheelState;

pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use command::{WheelAction, WheelCommand};
pub use config::{DecoderConfig, NinebotVariant};
pub use registry::DecoderRegistry;

/// The wheel protocol families this crate decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelType {
    Gotway,
    Veteran,
    Kingsong,
    InmotionV1,
    InmotionV2,
    Ninebot,
    NinebotZ,
    /// Undetermined Gotway-or-Veteran link; latches on the first header seen.
    GotwayVirtual,
}

impl std::fmt::Display for WheelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WheelType::Gotway => "Gotway",
            WheelType::Veteran => "Veteran",
            WheelType::Kingsong => "Kingsong",
            WheelType::InmotionV1 => "InMotion",
            WheelType::InmotionV2 => "InMotion V2",
            WheelType::Ninebot => "Ninebot",
            WheelType::NinebotZ => "Ninebot Z",
            WheelType::GotwayVirtual => "Gotway/Veteran",
        };
        f.write_str(name)
    }
}

/// Result of one `decode` call that produced telemetry, commands or both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedData {
    /// The new snapshot (copy-modify of the previous one).
    pub state: WheelState,
    /// Outbound commands, to be executed in order with their delay hints.
    pub commands: Vec<WheelCommand>,
    /// A live-telemetry frame was decoded in this call.
    pub has_new_data: bool,
    /// One-shot event text for this call, if any.
    pub news: Option<String>,
}

/// Uniform decoder API. See the module docs for the host contract.
pub trait WheelDecoder: Send {
    /// Which protocol this decoder speaks.
    fn wheel_type(&self) -> WheelType;

    /// Feed a notification run. Returns `None` when nothing changed (no
    /// complete valid frame and no state transition).
    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData>;

    /// Identity/handshake complete enough for steady-state operation.
    fn is_ready(&self) -> bool;

    /// Clear all internal state. Idempotent.
    fn reset(&mut self);

    /// Commands to send once right after the connection is established.
    fn init_commands(&self, _config: &DecoderConfig) -> Vec<WheelCommand> {
        Vec::new()
    }

    /// The periodic request this protocol expects, if any.
    fn keep_alive_command(&self, _config: &DecoderConfig) -> Option<WheelCommand> {
        None
    }

    /// Cadence for `keep_alive_command`; 0 means no keep-alive.
    fn keep_alive_interval_ms(&self) -> u64 {
        0
    }

    /// Lower a semantic action into byte commands. Unsupported actions
    /// return an empty list.
    fn build_command(&self, action: &WheelAction, config: &DecoderConfig) -> Vec<WheelCommand>;
}

/// Create a decoder for `wheel_type`, or `None` for types this build does
/// not support.
pub fn create_decoder(wheel_type: WheelType) -> Option<Box<dyn WheelDecoder>> {
    use crate::protocol;
    let decoder: Box<dyn WheelDecoder> = match wheel_type {
        WheelType::Gotway => Box::new(protocol::gotway::GotwayDecoder::new()),
        WheelType::Veteran => Box::new(protocol::veteran::VeteranDecoder::new()),
        WheelType::Kingsong => Box::new(protocol::kingsong::KingsongDecoder::new()),
        WheelType::InmotionV1 => Box::new(protocol::inmotion::InmotionV1Decoder::new()),
        WheelType::InmotionV2 => Box::new(protocol::inmotion_v2::InmotionV2Decoder::new()),
        WheelType::Ninebot => Box::new(protocol::ninebot::NinebotDecoder::new()),
        WheelType::NinebotZ => Box::new(protocol::ninebot_z::NinebotZDecoder::new()),
        WheelType::GotwayVirtual => Box::new(protocol::autodetect::AutoDetectDecoder::new()),
    };
    Some(decoder)
}

/// Every type `create_decoder` accepts.
pub fn supported_types() -> Vec<WheelType> {
    vec![
        WheelType::Gotway,
        WheelType::Veteran,
        WheelType::Kingsong,
        WheelType::InmotionV1,
        WheelType::InmotionV2,
        WheelType::Ninebot,
        WheelType::NinebotZ,
        WheelType::GotwayVirtual,
    ]
}
