//! # Gotway / Begode Decoder
//!
//! Gotway boards stream 24-byte frames without any handshake, so identity is
//! probed, not negotiated: until a firmware string and a model name arrive,
//! every live frame triggers a one-byte ASCII request (`V` for firmware,
//! then `N` for name), capped at 50 attempts before falling back to
//! defaults. The firmware-protocol tag recovered from the reply prefix
//! selects parse variants: SV custom firmware reports signed speed/PWM
//! directly, moves the battery current and uses the MPU6500 temperature
//! formula.
//!
//! Frame types, dispatched on byte 18:
//!
//! | type | content |
//! |---|---|
//! | 0x00 | live telemetry |
//! | 0x01 | true voltage, dual-BMS summary, BMS current |
//! | 0x02 / 0x03 | BMS1 / BMS2 cell-voltage groups |
//! | 0x04 | odometer, settings word, tilt-back, LED, alert bitmask |
//! | 0x07 | battery current (sign-inverted), motor temp, true PWM |
//! | 0xFF | SV-only: cutout angle, braking current, PID |

use bitflags::bitflags;

use crate::constants::{
    GOTWAY_CMD_FIRMWARE, GOTWAY_CMD_NAME, GOTWAY_FRAME_TYPE_OFFSET, GOTWAY_IDENTITY_RETRY_CAP,
    GOTWAY_RATIO, MILES_PER_KM,
};
use crate::decoder::{DecodedData, DecoderConfig, WheelAction, WheelCommand, WheelDecoder, WheelType};
use crate::telemetry::{SmartBms, WheelState};
use crate::unpack::{GotwayUnpacker, Unpacker};
use crate::util::codec::{be_i16, be_u16, be_u32, round_half_away};

/// Firmware lineage recovered from the identity-probe reply prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirmwareProtocol {
    #[default]
    Unknown,
    /// `GW` prefix, stock firmware
    Begode,
    /// `JN` prefix
    ExtremeBull,
    /// `CF` prefix
    Freestyl3r,
    /// `BF` prefix, Alexovik/SmirnoV custom firmware
    Sv,
}

impl FirmwareProtocol {
    fn label(self) -> &'static str {
        match self {
            FirmwareProtocol::Unknown | FirmwareProtocol::Begode => "Begode",
            FirmwareProtocol::ExtremeBull => "ExtremeBull",
            FirmwareProtocol::Freestyl3r => "Freestyl3r",
            FirmwareProtocol::Sv => "SV",
        }
    }
}

bitflags! {
    /// Alert bitmask at byte 14 of frame 0x04.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct GotwayAlert: u8 {
        const WHEEL_ALARM      = 0x01;
        const SPEED2           = 0x02;
        const SPEED1           = 0x04;
        const LOW_VOLTAGE      = 0x08;
        const OVER_VOLTAGE     = 0x10;
        const OVER_TEMPERATURE = 0x20;
        const HALL_SENSORS     = 0x40;
        const TRANSPORT_MODE   = 0x80;
    }
}

impl GotwayAlert {
    fn describe(self) -> String {
        const NAMES: [(GotwayAlert, &str); 8] = [
            (GotwayAlert::WHEEL_ALARM, "Alarm"),
            (GotwayAlert::SPEED2, "Speed2"),
            (GotwayAlert::SPEED1, "Speed1"),
            (GotwayAlert::LOW_VOLTAGE, "LowVoltage"),
            (GotwayAlert::OVER_VOLTAGE, "OverVoltage"),
            (GotwayAlert::OVER_TEMPERATURE, "OverTemperature"),
            (GotwayAlert::HALL_SENSORS, "errHallSensors"),
            (GotwayAlert::TRANSPORT_MODE, "TransportMode"),
        ];
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Stateful Gotway/Begode protocol decoder.
pub struct GotwayDecoder {
    unpacker: GotwayUnpacker,
    firmware: FirmwareProtocol,
    model: String,
    version: String,
    imu: String,
    identity_attempts: u32,
    ready: bool,
    // Protocol-feature latches set by extended frames.
    true_voltage: bool,
    true_current: bool,
    bms_current: bool,
    true_pwm: bool,
    /// Wheel-side display units, latched from the frame 0x04 settings word.
    in_miles: bool,
    bms1: SmartBms,
    bms2: SmartBms,
}

impl GotwayDecoder {
    pub fn new() -> Self {
        Self {
            unpacker: GotwayUnpacker::new(),
            firmware: FirmwareProtocol::Unknown,
            model: String::new(),
            version: String::new(),
            imu: String::new(),
            identity_attempts: 0,
            ready: false,
            true_voltage: false,
            true_current: false,
            bms_current: false,
            true_pwm: false,
            in_miles: false,
            bms1: SmartBms::default(),
            bms2: SmartBms::default(),
        }
    }

    /// IMU identifier reported by an `MPU`-prefixed identity reply.
    pub fn imu_id(&self) -> &str {
        &self.imu
    }

    /// Standard 67.2 V-class battery curve on the unscaled V×100 reading.
    fn battery_standard(voltage: i32) -> i32 {
        if voltage < 5290 {
            0
        } else if voltage > 6580 {
            100
        } else {
            (voltage - 5290) / 13
        }
    }

    /// Custom curve with a steeper tail below 54.4 V.
    fn battery_custom(voltage: i32) -> i32 {
        if voltage > 6680 {
            100
        } else if voltage > 5440 {
            ((voltage - 5320) as f64 / 13.6) as i32
        } else if voltage > 5120 {
            (voltage - 5120) / 36
        } else {
            0
        }
    }

    /// IMU raw reading to °C×100. SV boards carry an MPU6500, stock an MPU6050.
    fn temperature_centi(&self, raw: i16) -> i32 {
        let celsius = if self.firmware == FirmwareProtocol::Sv {
            raw as f64 / 333.87 + 21.0
        } else {
            raw as f64 / 340.0 + 36.53
        };
        round_half_away(celsius * 100.0) as i32
    }

    /// Polarity rule for speed and hwPwm: SV firmware already reports the
    /// correct sign, so a non-zero knob leaves its values untouched.
    fn apply_drive_polarity(&self, value: i32, config: &DecoderConfig) -> i32 {
        if self.firmware == FirmwareProtocol::Sv && config.gotway_negative != 0 {
            value
        } else {
            config.apply_polarity(value)
        }
    }

    fn scale_distance(&self, meters: u64, config: &DecoderConfig) -> u64 {
        let mut value = meters as f64;
        if config.use_ratio {
            value *= GOTWAY_RATIO;
        }
        if self.in_miles {
            value /= MILES_PER_KM;
        }
        round_half_away(value) as u64
    }

    /// Handle a short ASCII identity reply. Returns the new snapshot when
    /// the reply changed the identity.
    fn try_identity(&mut self, data: &[u8], previous: &WheelState) -> Option<DecodedData> {
        let text = std::str::from_utf8(data).ok()?;
        let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

        if let Some(rest) = trimmed.strip_prefix("NAME") {
            let name = rest.trim_start_matches([':', ' ']).trim();
            if name.is_empty() {
                return None;
            }
            self.model = name.to_string();
            log::info!("gotway: wheel name \"{}\"", self.model);
        } else if let Some(tag) = match trimmed.get(..2) {
            Some("GW") => Some(FirmwareProtocol::Begode),
            Some("JN") => Some(FirmwareProtocol::ExtremeBull),
            Some("CF") => Some(FirmwareProtocol::Freestyl3r),
            Some("BF") => Some(FirmwareProtocol::Sv),
            _ => None,
        } {
            self.firmware = tag;
            let rest = trimmed[2..].trim();
            self.version = if rest.is_empty() {
                trimmed.to_string()
            } else {
                rest.to_string()
            };
            log::info!("gotway: firmware {} ({})", self.version, tag.label());
        } else if trimmed.starts_with("MPU") {
            self.imu = trimmed.to_string();
            return None;
        } else {
            return None;
        }

        let mut state = previous.clone();
        state.model = self.model.clone();
        state.version = self.version.clone();
        if state == *previous {
            return None;
        }
        Some(DecodedData {
            state,
            commands: Vec::new(),
            has_new_data: false,
            news: None,
        })
    }

    /// Identity retry loop, driven once per live frame.
    fn identity_retry(&mut self, state: &mut WheelState, commands: &mut Vec<WheelCommand>) {
        if self.ready {
            return;
        }
        let fw_known = self.firmware != FirmwareProtocol::Unknown;
        let model_known = !self.model.is_empty();
        if fw_known && model_known {
            self.ready = true;
            return;
        }
        if self.identity_attempts >= GOTWAY_IDENTITY_RETRY_CAP {
            if self.model.is_empty() {
                self.model = self.firmware.label().to_string();
            }
            if self.version.is_empty() {
                self.version = "-".to_string();
            }
            self.ready = true;
            state.model = self.model.clone();
            state.version = self.version.clone();
            log::warn!(
                "gotway: identity probe exhausted, defaulting to {} / {}",
                state.model,
                state.version
            );
            return;
        }
        self.identity_attempts += 1;
        let request = if !fw_known {
            GOTWAY_CMD_FIRMWARE
        } else {
            GOTWAY_CMD_NAME
        };
        commands.push(WheelCommand::Bytes(vec![request]));
    }

    /// Dispatch one complete 24-byte frame. Returns whether state changed.
    fn parse_frame(
        &mut self,
        frame: &[u8],
        state: &mut WheelState,
        config: &DecoderConfig,
        has_new_data: &mut bool,
        news: &mut Option<String>,
        commands: &mut Vec<WheelCommand>,
    ) -> bool {
        match frame[GOTWAY_FRAME_TYPE_OFFSET] {
            0x00 => {
                self.parse_live(frame, state, config);
                *has_new_data = true;
                self.identity_retry(state, commands);
                true
            }
            0x01 => {
                self.parse_extended(frame, state);
                true
            }
            0x02 => {
                self.parse_cells(frame, false, state);
                true
            }
            0x03 => {
                self.parse_cells(frame, true, state);
                true
            }
            0x04 => {
                self.parse_totals(frame, state, config, news);
                true
            }
            0x07 => {
                self.parse_battery_current(frame, state, config);
                true
            }
            0xFF if self.firmware == FirmwareProtocol::Sv => {
                self.parse_sv_extras(frame, state);
                true
            }
            other => {
                log::debug!("gotway: ignoring frame type {other:#04x}");
                false
            }
        }
    }

    fn parse_live(&mut self, frame: &[u8], state: &mut WheelState, config: &DecoderConfig) {
        let voltage_raw = be_u16(frame, 2) as i32;
        let speed_raw = be_i16(frame, 4) as i32;
        let distance_raw = be_u16(frame, 8) as u64;
        let phase_raw = be_i16(frame, 10) as i32;
        let temperature_raw = be_i16(frame, 12);
        let pwm_raw = be_i16(frame, 14) as i32;

        let mut speed = round_half_away(speed_raw as f64 * 3.6) as i32;
        speed = self.apply_drive_polarity(speed, config);
        if config.use_ratio {
            speed = round_half_away(speed as f64 * GOTWAY_RATIO) as i32;
        }
        if self.in_miles {
            speed = round_half_away(speed as f64 / MILES_PER_KM) as i32;
        }
        state.speed = speed;

        // Once frame 0x01 has supplied the true pack voltage, the live
        // frame's coarser reading no longer overwrites it.
        if !self.true_voltage {
            state.voltage =
                round_half_away(voltage_raw as f64 * config.voltage_multiplier()) as u32;
        }
        state.battery_level = if config.use_custom_percents {
            Self::battery_custom(voltage_raw)
        } else {
            Self::battery_standard(voltage_raw)
        };

        state.wheel_distance = self.scale_distance(distance_raw, config);
        state.phase_current = config.apply_polarity(phase_raw);
        state.temperature = self.temperature_centi(temperature_raw);

        if !self.true_pwm {
            let output = self.apply_drive_polarity(pwm_raw * 10, config);
            state.output = output;
            state.calculated_pwm = output as f64 / 10000.0;
        }

        if !self.true_current && !self.bms_current {
            state.current = state.phase_current;
        }
        state.update_power();
        state.in_miles = self.in_miles;
    }

    fn parse_extended(&mut self, frame: &[u8], state: &mut WheelState) {
        self.true_voltage = true;
        self.bms_current = true;

        state.voltage = be_u16(frame, 2) as u32;
        self.bms1.voltage = be_u16(frame, 4) as f64 / 100.0;
        self.bms2.voltage = be_u16(frame, 6) as f64 / 100.0;
        self.bms1.temperatures[0] = be_i16(frame, 8) as f64 / 100.0;
        self.bms2.temperatures[0] = be_i16(frame, 10) as f64 / 100.0;

        let bms_current = be_i16(frame, 12) as i32;
        self.bms1.current = bms_current as f64 / 100.0;
        if !self.true_current {
            state.current = bms_current;
        }
        state.update_power();
        state.bms1 = Some(self.bms1.clone());
        state.bms2 = Some(self.bms2.clone());
    }

    fn parse_cells(&mut self, frame: &[u8], second_pack: bool, state: &mut WheelState) {
        // Low nibble of byte 19 selects the 8-cell group within the pack.
        let group = (frame[19] & 0x0F) as usize;
        let base = group * 8;
        let bms = if second_pack { &mut self.bms2 } else { &mut self.bms1 };
        for i in 0..8 {
            let millivolts = be_u16(frame, 2 + 2 * i);
            if millivolts != 0 {
                bms.set_cell(base + i, millivolts as f64 / 1000.0);
            }
        }
        bms.recompute();
        if second_pack {
            state.bms2 = Some(self.bms2.clone());
        } else {
            state.bms1 = Some(self.bms1.clone());
        }
    }

    fn parse_totals(
        &mut self,
        frame: &[u8],
        state: &mut WheelState,
        config: &DecoderConfig,
        news: &mut Option<String>,
    ) {
        let settings = be_u16(frame, 6);
        // Settings word bit layout; raw pedals value 3 publishes -1, kept as
        // the firmware defined it.
        let pedals_raw = ((settings >> 13) & 0x03) as i32;
        state.pedals_mode = 2 - pedals_raw;
        state.speed_alarms_mode = ((settings >> 10) & 0x07) as i32;
        state.roll_angle_mode = ((settings >> 7) & 0x07) as i32;
        self.in_miles = settings & 0x01 != 0;
        state.in_miles = self.in_miles;

        state.total_distance = self.scale_distance(be_u32(frame, 2) as u64, config);

        let tilt_back = be_u16(frame, 8) as i32;
        state.tilt_back_speed = if tilt_back >= 100 { 0 } else { tilt_back * 100 };

        state.light_mode = frame[15] as i32;
        state.led_mode = frame[13] as i32;

        let alerts = GotwayAlert::from_bits_truncate(frame[14]);
        if !alerts.is_empty() {
            let text = alerts.describe();
            state.alert = text.clone();
            *news = Some(text);
        }
    }

    fn parse_battery_current(&mut self, frame: &[u8], state: &mut WheelState, config: &DecoderConfig) {
        self.true_current = true;
        // Historical sign inversion, kept: positive wire value = discharge.
        state.current = -(be_i16(frame, 2) as i32);
        state.temperature2 = be_i16(frame, 4) as i32;

        self.true_pwm = true;
        let output = self.apply_drive_polarity(be_i16(frame, 6) as i32 * 10, config);
        state.output = output;
        state.calculated_pwm = output as f64 / 10000.0;
        state.update_power();
    }

    fn parse_sv_extras(&mut self, frame: &[u8], state: &mut WheelState) {
        state.cutout_angle = be_u16(frame, 2) as i32 + 260;
        state.braking_current = be_u16(frame, 4) as i32;
        state.pid_value = be_u16(frame, 6) as i32;
    }
}

impl Default for GotwayDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for GotwayDecoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::Gotway
    }

    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData> {
        if let Some(identity) = self.try_identity(data, previous) {
            return Some(identity);
        }

        let mut state = previous.clone();
        let mut commands = Vec::new();
        let mut news = None;
        let mut has_new_data = false;
        let mut changed = false;

        for &byte in data {
            if self.unpacker.add_byte(byte) {
                let frame = self.unpacker.frame().to_vec();
                self.unpacker.reset();
                changed |= self.parse_frame(
                    &frame,
                    &mut state,
                    config,
                    &mut has_new_data,
                    &mut news,
                    &mut commands,
                );
            }
        }

        if !changed && commands.is_empty() {
            return None;
        }
        state.news = news.clone().unwrap_or_default();
        Some(DecodedData {
            state,
            commands,
            has_new_data,
            news,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn reset(&mut self) {
        self.unpacker.reset();
        self.firmware = FirmwareProtocol::Unknown;
        self.model.clear();
        self.version.clear();
        self.imu.clear();
        self.identity_attempts = 0;
        self.ready = false;
        self.true_voltage = false;
        self.true_current = false;
        self.bms_current = false;
        self.true_pwm = false;
        self.in_miles = false;
        self.bms1 = SmartBms::default();
        self.bms2 = SmartBms::default();
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        match action {
            WheelAction::Beep => vec![WheelCommand::Bytes(b"b".to_vec())],
            WheelAction::LightOn => vec![WheelCommand::Bytes(b"Q".to_vec())],
            WheelAction::LightOff => vec![WheelCommand::Bytes(b"E".to_vec())],
            WheelAction::LightStrobe => vec![WheelCommand::Bytes(b"T".to_vec())],
            WheelAction::PedalsMode(mode) => {
                let byte = match mode {
                    0 => b'h',
                    1 => b'f',
                    2 => b's',
                    _ => b'i',
                };
                vec![WheelCommand::Bytes(vec![byte])]
            }
            WheelAction::Miles(true) => vec![WheelCommand::Bytes(b"m".to_vec())],
            WheelAction::Miles(false) => vec![WheelCommand::Bytes(b"g".to_vec())],
            WheelAction::RollAngleMode(mode) => {
                let byte = match mode {
                    0 => b'>',
                    1 => b'=',
                    _ => b'<',
                };
                vec![WheelCommand::Bytes(vec![byte])]
            }
            WheelAction::Calibrate => vec![
                WheelCommand::Bytes(b"c".to_vec()),
                WheelCommand::BytesWithDelay {
                    bytes: b"y".to_vec(),
                    delay_ms: 300,
                },
            ],
            WheelAction::SetMaxSpeed(kmh) => {
                let tens = b'0' + kmh / 10;
                let units = b'0' + kmh % 10;
                vec![
                    WheelCommand::Bytes(b"b".to_vec()),
                    WheelCommand::BytesWithDelay {
                        bytes: b"W".to_vec(),
                        delay_ms: 100,
                    },
                    WheelCommand::BytesWithDelay {
                        bytes: b"Y".to_vec(),
                        delay_ms: 100,
                    },
                    WheelCommand::BytesWithDelay {
                        bytes: vec![tens],
                        delay_ms: 100,
                    },
                    WheelCommand::BytesWithDelay {
                        bytes: vec![units],
                        delay_ms: 100,
                    },
                    WheelCommand::BytesWithDelay {
                        bytes: b"b".to_vec(),
                        delay_ms: 100,
                    },
                    WheelCommand::BytesWithDelay {
                        bytes: b"b".to_vec(),
                        delay_ms: 300,
                    },
                ]
            }
            WheelAction::SetCutoutAngle(angle) => {
                let raw = angle.saturating_sub(260) as u8;
                vec![WheelCommand::Bytes(vec![0x72, 0x73, raw])]
            }
            _ => Vec::new(),
        }
    }
}
