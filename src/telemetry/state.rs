//! # Wheel Telemetry Snapshot
//!
//! [`WheelState`] is the immutable record a `decode` call produces: the
//! decoder copies the caller's previous snapshot, overwrites whatever the
//! frame carried, and hands the new value back. All physical quantities are
//! fixed-point integers so snapshot equality is exact; hosts detect "has
//! anything changed" with `==` and never compare floats.
//!
//! Units:
//!
//! | field | unit |
//! |---|---|
//! | `speed` | km/h × 100, signed (reverse preserved when polarity is non-zero) |
//! | `voltage` | V × 100 |
//! | `current`, `phase_current` | A × 100, signed (negative while regenerating) |
//! | `power` | W, derived `round((current/100) × voltage)` |
//! | `temperature`, `temperature2` | °C × 100, signed |
//! | `wheel_distance`, `total_distance` | meters, always metric |
//! | `battery_level` | percent, may exceed 100 right after charging |
//! | `output` | PWM × 10000 |
//! | `calculated_pwm` | ratio 0..1, the one float in the record |
//!
//! `in_miles` is informational only: it records that the wheel itself is set
//! to display miles, while the distance and speed fields here are already
//! normalized to metric by the decoder.

use serde::{Deserialize, Serialize};

use crate::telemetry::SmartBms;
use crate::util::codec::round_half_away;

/// Immutable telemetry snapshot produced by one `decode` call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelState {
    /// Speed, km/h × 100, signed
    pub speed: i32,
    /// Battery voltage, V × 100
    pub voltage: u32,
    /// Battery current, A × 100, signed
    pub current: i32,
    /// Motor phase current, A × 100, signed
    pub phase_current: i32,
    /// Power, watts, signed
    pub power: i32,
    /// Controller temperature, °C × 100
    pub temperature: i32,
    /// Secondary (motor/board) temperature, °C × 100
    pub temperature2: i32,
    /// Trip distance, meters
    pub wheel_distance: u64,
    /// Odometer, meters
    pub total_distance: u64,
    /// Battery level, percent
    pub battery_level: i32,
    /// PWM duty, × 10000
    pub output: i32,
    /// PWM duty as a ratio; never NaN
    pub calculated_pwm: f64,
    /// Wheel is configured to display miles (fields here stay metric)
    pub in_miles: bool,

    // Identity
    /// Model name as reported or derived
    pub model: String,
    /// Firmware version string
    pub version: String,
    /// Serial number
    pub serial_number: String,
    /// Ride/work mode as text
    pub mode_str: String,

    // Battery packs
    pub bms1: Option<SmartBms>,
    pub bms2: Option<SmartBms>,

    // Events
    /// Last decoded alert line, sticky until overwritten
    pub alert: String,
    /// One-shot event text attached to this snapshot
    pub news: String,
    /// Last decoded error text
    pub error: String,

    // Orientation (InMotion, Veteran)
    /// Pitch angle, degrees × 100, signed
    pub angle: i32,
    /// Roll angle, degrees × 100, signed
    pub roll: i32,

    // Settings and auxiliary readouts (populated per protocol)
    /// Fan state byte as reported
    pub fan_status: i32,
    /// Controller CPU load, percent
    pub cpu_load: i32,
    /// Charging state byte as reported
    pub charging_status: i32,
    /// Charge mode word (Veteran)
    pub charge_mode: i32,
    /// Auto-shutdown countdown, seconds (Veteran)
    pub auto_off_sec: i32,
    /// Speed alarm threshold, km/h × 100
    pub speed_alert: i32,
    /// Firmware speed limit, km/h × 100
    pub speed_limit: i32,
    /// Tilt-back engagement speed, km/h × 100
    pub tilt_back_speed: i32,
    /// Alarm thresholds, km/h (Kingsong)
    pub alarm1_speed: i32,
    pub alarm2_speed: i32,
    pub alarm3_speed: i32,
    /// Configured maximum speed, km/h × 100
    pub max_speed: i32,
    /// Pedals firmness mode as published (Gotway: `2 - raw`)
    pub pedals_mode: i32,
    /// Pedal tilt adjustment, degrees × 100, signed (InMotion V2)
    pub pedals_adjustment: i32,
    /// Roll-angle mode selector (Gotway)
    pub roll_angle_mode: i32,
    /// Speed-alarm selector (Gotway settings word)
    pub speed_alarms_mode: i32,
    /// LED mode byte
    pub led_mode: i32,
    /// Light state byte
    pub light_mode: i32,
    /// Headlight brightness, percent (InMotion V2)
    pub light_brightness: i32,
    /// Speaker volume, percent (InMotion)
    pub speaker_volume: i32,
    /// Ride-mode flag: firm/"fancier" riding dynamics (InMotion V2)
    pub ride_mode: bool,
    /// Pedal sensitivity for the comfort profile (InMotion V2)
    pub comfort_sensitivity: i32,
    /// Pedal sensitivity for the classic profile (InMotion V2)
    pub classic_sensitivity: i32,
    /// Cutout (lift-cut) angle, degrees (SV Gotway firmware)
    pub cutout_angle: i32,
    /// Braking current limit, A (SV Gotway firmware)
    pub braking_current: i32,
    /// Firmware PID/tuning word (SV Gotway firmware)
    pub pid_value: i32,
}

impl WheelState {
    /// Recompute `power` from the current `voltage` and `current` fields.
    pub fn update_power(&mut self) {
        self.power = round_half_away(self.current as f64 / 100.0 * self.voltage as f64) as i32;
    }

    /// Speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        self.speed as f64 / 100.0
    }

    /// Battery voltage in volts.
    pub fn voltage_volts(&self) -> f64 {
        self.voltage as f64 / 100.0
    }

    /// Battery current in amps.
    pub fn current_amps(&self) -> f64 {
        self.current as f64 / 100.0
    }

    /// Motor phase current in amps.
    pub fn phase_current_amps(&self) -> f64 {
        self.phase_current as f64 / 100.0
    }

    /// Controller temperature in °C.
    pub fn temperature_celsius(&self) -> f64 {
        self.temperature as f64 / 100.0
    }

    /// Trip distance in kilometers.
    pub fn wheel_distance_km(&self) -> f64 {
        self.wheel_distance as f64 / 1000.0
    }

    /// Odometer in kilometers.
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance as f64 / 1000.0
    }

    /// PWM duty as a percentage of full output.
    pub fn output_percent(&self) -> f64 {
        self.output as f64 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_derivation() {
        let mut state = WheelState {
            voltage: 9686,
            current: -340,
            ..Default::default()
        };
        state.update_power();
        assert_eq!(state.power, round_half_away(-3.40 * 9686.0) as i32);
    }

    #[test]
    fn test_unit_views() {
        let state = WheelState {
            speed: 4000,
            voltage: 6000,
            wheel_distance: 3231,
            output: 1250,
            ..Default::default()
        };
        assert_eq!(state.speed_kmh(), 40.0);
        assert_eq!(state.voltage_volts(), 60.0);
        assert_eq!(state.wheel_distance_km(), 3.231);
        assert_eq!(state.output_percent(), 12.5);
    }

    #[test]
    fn test_snapshot_equality_is_exact() {
        let a = WheelState {
            speed: 1,
            calculated_pwm: 0.1,
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a, b);

        let c = WheelState {
            calculated_pwm: 0.1 + 1e-12,
            ..a.clone()
        };
        assert_ne!(a, c);
    }
}
