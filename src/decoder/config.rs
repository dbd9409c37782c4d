//! # Caller-Supplied Decoder Options
//!
//! Everything a host can tune about decoding lives here, passed by reference
//! into every `decode` call so a settings change applies from the next frame
//! without touching decoder state.

use serde::{Deserialize, Serialize};

/// Ninebot protocol flavor. The generations share framing but move fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NinebotVariant {
    #[default]
    Default,
    /// S2 boards put an unsigned speed word at offset 28 (up to 320 km/h).
    S2,
    Mini,
}

/// Decoder options supplied by the caller.
///
/// `gotway_negative` is a three-state knob, not a sign: `0` means "publish
/// absolute values", `-1`/`1` multiply the raw reading. Veteran reuses it as
/// its polarity switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Speed/current/PWM polarity: -1, 0 (absolute) or 1
    pub gotway_negative: i8,
    /// Voltage-multiplier selector, 0..=6 (67 V through 168 V classes)
    pub gotway_voltage: u8,
    /// Apply the 0.875 gear-ratio correction (Gotway)
    pub use_ratio: bool,
    /// Use the custom battery curve instead of the standard one (Gotway)
    pub use_custom_percents: bool,
    /// Use the optimistic battery curve (Veteran)
    pub use_better_percents: bool,
    /// Trust the board's hardware PWM instead of computing one (Veteran)
    pub hw_pwm_enabled: bool,
    /// Rotation test speed, km/h × 100 (Veteran computed PWM)
    pub rotation_speed: f64,
    /// Rotation test voltage, V × 100 (Veteran computed PWM)
    pub rotation_voltage: f64,
    /// Motor power factor, ratio (Veteran computed PWM)
    pub power_factor: f64,
    /// Six-digit pin for InMotion V1 wheels that require unlocking
    pub password: String,
    /// Walk the BMS handshake states instead of going straight to live data
    /// (Ninebot-Z)
    pub bms_reading_mode: bool,
    /// Ninebot protocol flavor
    pub ninebot_variant: NinebotVariant,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            gotway_negative: 0,
            gotway_voltage: 0,
            use_ratio: false,
            use_custom_percents: false,
            use_better_percents: false,
            hw_pwm_enabled: false,
            // Sherman-class rotation test defaults: 80 km/h at 96 V
            rotation_speed: 8000.0,
            rotation_voltage: 9600.0,
            power_factor: 0.9,
            password: String::new(),
            bms_reading_mode: false,
            ninebot_variant: NinebotVariant::Default,
        }
    }
}

impl DecoderConfig {
    /// Polarity-normalize a raw signed reading per `gotway_negative`.
    pub fn apply_polarity(&self, value: i32) -> i32 {
        match self.gotway_negative {
            0 => value.abs(),
            n => value * n as i32,
        }
    }

    /// Voltage multiplier for the configured wheel class.
    pub fn voltage_multiplier(&self) -> f64 {
        match self.gotway_voltage {
            1 => 1.25,
            2 => 1.5,
            3 => 1.738_095_238_095_238_1,
            4 => 2.0,
            5 => 2.5,
            6 => 2.25,
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_semantics() {
        let mut config = DecoderConfig::default();
        assert_eq!(config.apply_polarity(-1111), 1111);

        config.gotway_negative = 1;
        assert_eq!(config.apply_polarity(-1111), -1111);

        config.gotway_negative = -1;
        assert_eq!(config.apply_polarity(-1111), 1111);
        assert_eq!(config.apply_polarity(1111), -1111);
    }

    #[test]
    fn test_voltage_multiplier_table() {
        let multipliers: Vec<f64> = (0..=6)
            .map(|i| {
                DecoderConfig {
                    gotway_voltage: i,
                    ..Default::default()
                }
                .voltage_multiplier()
            })
            .collect();
        assert_eq!(
            multipliers,
            vec![1.0, 1.25, 1.5, 1.738_095_238_095_238_1, 2.0, 2.5, 2.25]
        );
    }
}
