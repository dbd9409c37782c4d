//! # Outbound Commands
//!
//! Two layers: [`WheelAction`] is the semantic request a host makes
//! ("beep", "set max speed to 45"), and [`WheelCommand`] is the byte-level
//! artifact a decoder lowers it into. A single action may lower into several
//! commands staggered with relative delay hints (Gotway max-speed setting is
//! a seven-command sequence); the host must send them in order, honoring the
//! hints. The core never sleeps.

use serde::{Deserialize, Serialize};

/// A byte sequence for the transport to write, optionally after a relative
/// delay from the previous command in the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WheelCommand {
    /// Write these bytes now.
    Bytes(Vec<u8>),
    /// Write these bytes `delay_ms` after the previous command.
    BytesWithDelay { bytes: Vec<u8>, delay_ms: u64 },
}

impl WheelCommand {
    /// The payload bytes regardless of delay.
    pub fn bytes(&self) -> &[u8] {
        match self {
            WheelCommand::Bytes(b) => b,
            WheelCommand::BytesWithDelay { bytes, .. } => bytes,
        }
    }

    /// The relative delay hint, 0 for immediate commands.
    pub fn delay_ms(&self) -> u64 {
        match self {
            WheelCommand::Bytes(_) => 0,
            WheelCommand::BytesWithDelay { delay_ms, .. } => *delay_ms,
        }
    }
}

/// Semantic wheel actions, translated to bytes by each protocol's
/// `build_command`. Actions a protocol cannot express lower to an empty
/// command list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WheelAction {
    /// Horn / beeper
    Beep,
    /// Headlight on
    LightOn,
    /// Headlight off
    LightOff,
    /// Headlight strobe (Gotway)
    LightStrobe,
    /// Pedal firmness selector, protocol-specific range
    PedalsMode(u8),
    /// Display units on the wheel itself
    Miles(bool),
    /// Roll-angle mode selector (Gotway)
    RollAngleMode(u8),
    /// Start pedal calibration
    Calibrate,
    /// Maximum speed / tilt-back threshold, km/h
    SetMaxSpeed(u8),
    /// Lift-cut angle, degrees (SV Gotway firmware only)
    SetCutoutAngle(u16),
    /// Alarm thresholds plus max speed, km/h each (Kingsong)
    SetAlarms {
        alarm1: u8,
        alarm2: u8,
        alarm3: u8,
        max_speed: u8,
    },
    /// Play a built-in sound (InMotion)
    PlaySound(u8),
    /// Speaker volume, percent (InMotion)
    SetSpeakerVolume(u8),
    /// Headlight brightness, percent (InMotion V2)
    SetLightBrightness(u8),
    /// Pedal tilt, degrees × 100, signed (InMotion V2)
    SetPedalTilt(i16),
    /// Ask the wheel for its name/model record
    RequestName,
    /// Ask the wheel for its serial number
    RequestSerial,
    /// Ask the wheel for its current settings
    RequestSettings,
    /// Remote power-off where the protocol supports it
    PowerOff,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_accessors() {
        let plain = WheelCommand::Bytes(vec![0x62]);
        assert_eq!(plain.bytes(), &[0x62]);
        assert_eq!(plain.delay_ms(), 0);

        let delayed = WheelCommand::BytesWithDelay {
            bytes: vec![0x79],
            delay_ms: 300,
        };
        assert_eq!(delayed.bytes(), &[0x79]);
        assert_eq!(delayed.delay_ms(), 300);
    }
}
