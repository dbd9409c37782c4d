//! # InMotion V2 Decoder
//!
//! The V11-and-later InMotion protocol is command-oriented: the app drives
//! the whole conversation with typed requests (`0x11` flags during the
//! handshake, `0x14` afterwards) and the wheel answers with the same command
//! byte. The keep-alive cycles through the handshake targets until car type,
//! serial and versions are all known, then settles on the real-time request.
//!
//! Settings frames are the messy part: each model family rearranged the
//! payload. The per-family offset tables live in [`SettingsLayout`].

use crate::constants::{
    INMOTION_V2_CMD_BATTERY_REAL_TIME, INMOTION_V2_CMD_CONTROL, INMOTION_V2_CMD_MAIN_INFO,
    INMOTION_V2_CMD_MAIN_VERSION, INMOTION_V2_CMD_REAL_TIME, INMOTION_V2_CMD_SETTINGS,
    INMOTION_V2_CMD_SETTINGS_RESPONSE, INMOTION_V2_CMD_TOTAL_STATS, INMOTION_V2_FLAG_DEFAULT,
    INMOTION_V2_FLAG_INITIAL, INMOTION_V2_INFO_CAR_TYPE, INMOTION_V2_INFO_SERIAL,
    INMOTION_V2_INFO_VERSIONS, INMOTION_V2_KEEP_ALIVE_MS,
};
use crate::decoder::{DecodedData, DecoderConfig, WheelAction, WheelCommand, WheelDecoder, WheelType};
use crate::telemetry::{SmartBms, WheelState};
use crate::unpack::inmotion_v2::frame_command;
use crate::unpack::{InmotionV2Unpacker, Unpacker};
use crate::util::codec::{le_i16, le_u16, le_u32};
use crate::util::hex::encode_hex_upper;

/// `(series, type)` model pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    V11,
    V11Y,
    V12Hs,
    V12Ht,
    V12Pro,
    V12S,
    V13,
    V13Pro,
    V14g,
    V14s,
    V9,
    Unknown,
}

impl Model {
    fn from_series_type(series: u8, car_type: u8) -> Model {
        match (series, car_type) {
            (6, 1) => Model::V11,
            (6, 2) => Model::V11Y,
            (7, 1) => Model::V12Hs,
            (7, 2) => Model::V12Ht,
            (7, 3) => Model::V12Pro,
            (8, 1) => Model::V13,
            (8, 2) => Model::V13Pro,
            (9, 1) => Model::V14g,
            (9, 2) => Model::V14s,
            (11, 1) => Model::V12S,
            (12, 1) => Model::V9,
            _ => Model::Unknown,
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Model::V11 => "InMotion V11",
            Model::V11Y => "InMotion V11Y",
            Model::V12Hs => "InMotion V12 HS",
            Model::V12Ht => "InMotion V12 HT",
            Model::V12Pro => "InMotion V12 PRO",
            Model::V12S => "InMotion V12S",
            Model::V13 => "InMotion V13",
            Model::V13Pro => "InMotion V13 PRO",
            Model::V14g => "InMotion V14g",
            Model::V14s => "InMotion V14s",
            Model::V9 => "InMotion V9",
            Model::Unknown => "InMotion V2",
        }
    }

    fn cell_count(self) -> usize {
        match self {
            Model::V11 | Model::V11Y | Model::V9 => 20,
            Model::V12Hs | Model::V12Ht | Model::V12Pro | Model::V12S => 24,
            Model::V13 | Model::V13Pro => 30,
            Model::V14g | Model::V14s => 32,
            Model::Unknown => 20,
        }
    }

    fn settings_layout(self) -> SettingsLayout {
        match self {
            Model::V13 | Model::V13Pro | Model::V14g | Model::V14s => SettingsLayout::V13,
            Model::V11Y | Model::V9 => SettingsLayout::V11y,
            Model::V12Hs | Model::V12Ht | Model::V12Pro | Model::V12S => SettingsLayout::V12,
            _ => SettingsLayout::V11,
        }
    }
}

/// Per-family settings payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsLayout {
    V11,
    V13,
    V11y,
    V12,
}

impl SettingsLayout {
    /// (max_speed, pedal_tilt, mode_byte, sensitivity, speaker, brightness, flags)
    /// offsets within the settings payload; `None` where the family dropped
    /// the field.
    fn offsets(
        self,
    ) -> (
        usize,
        usize,
        usize,
        usize,
        Option<usize>,
        Option<usize>,
        usize,
    ) {
        match self {
            SettingsLayout::V11 => (1, 3, 5, 6, Some(8), Some(18), 21),
            SettingsLayout::V13 => (1, 9, 11, 12, None, None, 31),
            SettingsLayout::V11y => (1, 9, 11, 12, None, None, 31),
            SettingsLayout::V12 => (9, 15, 19, 20, Some(22), None, 39),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ModelUnknown,
    AwaitingSerial,
    AwaitingVersions,
    Streaming,
}

/// Stateful InMotion V2 protocol decoder.
pub struct InmotionV2Decoder {
    unpacker: InmotionV2Unpacker,
    phase: Phase,
    model: Model,
    serial: String,
    version: String,
    bms1: SmartBms,
}

impl InmotionV2Decoder {
    pub fn new() -> Self {
        Self {
            unpacker: InmotionV2Unpacker::new(),
            phase: Phase::ModelUnknown,
            model: Model::Unknown,
            serial: String::new(),
            version: String::new(),
            bms1: SmartBms::default(),
        }
    }

    /// Serial number once the handshake has recovered it.
    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    fn request(flags: u8, command: u8, data: &[u8]) -> WheelCommand {
        WheelCommand::Bytes(frame_command(flags, command, data))
    }

    fn car_type_request() -> WheelCommand {
        Self::request(INMOTION_V2_FLAG_INITIAL, INMOTION_V2_CMD_MAIN_INFO, &[INMOTION_V2_INFO_CAR_TYPE])
    }

    fn serial_request() -> WheelCommand {
        Self::request(INMOTION_V2_FLAG_INITIAL, INMOTION_V2_CMD_MAIN_INFO, &[INMOTION_V2_INFO_SERIAL])
    }

    fn versions_request() -> WheelCommand {
        Self::request(INMOTION_V2_FLAG_INITIAL, INMOTION_V2_CMD_MAIN_INFO, &[INMOTION_V2_INFO_VERSIONS])
    }

    fn settings_request() -> WheelCommand {
        Self::request(INMOTION_V2_FLAG_DEFAULT, INMOTION_V2_CMD_SETTINGS, &[])
    }

    fn real_time_request() -> WheelCommand {
        Self::request(INMOTION_V2_FLAG_DEFAULT, INMOTION_V2_CMD_REAL_TIME, &[])
    }

    fn parse_main_info(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        if data.is_empty() {
            return false;
        }
        match data[0] {
            sub if sub == INMOTION_V2_INFO_CAR_TYPE => {
                if data.len() < 3 {
                    return false;
                }
                self.model = Model::from_series_type(data[1], data[2]);
                state.model = self.model.display_name().to_string();
                if self.phase == Phase::ModelUnknown {
                    self.phase = Phase::AwaitingSerial;
                }
                log::info!(
                    "inmotion v2: series {} type {} -> {}",
                    data[1],
                    data[2],
                    state.model
                );
                true
            }
            sub if sub == INMOTION_V2_INFO_SERIAL => {
                if data.len() < 9 {
                    return false;
                }
                self.serial = encode_hex_upper(&data[1..9]);
                state.serial_number = self.serial.clone();
                if self.phase == Phase::AwaitingSerial {
                    self.phase = Phase::AwaitingVersions;
                }
                true
            }
            sub if sub == INMOTION_V2_INFO_VERSIONS => {
                if data.len() < 10 {
                    return false;
                }
                self.version = format!(
                    "Main:{}.{}.{} Drv:{}.{}.{} BLE:{}.{}.{}",
                    data[3], data[2], data[1], data[6], data[5], data[4], data[9], data[8], data[7]
                );
                state.version = self.version.clone();
                if self.phase == Phase::AwaitingVersions {
                    self.phase = Phase::Streaming;
                }
                true
            }
            other => {
                log::debug!("inmotion v2: ignoring main-info sub-key {other:#04x}");
                false
            }
        }
    }

    fn parse_real_time(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        if data.len() < 19 {
            return false;
        }
        state.voltage = le_u16(data, 0) as u32;
        state.current = le_i16(data, 2) as i32;
        state.speed = le_i16(data, 4) as i32;
        // PWM arrives on the same ×10000 basis the snapshot uses.
        state.output = le_i16(data, 6) as i32;
        state.calculated_pwm = state.output as f64 / 10000.0;
        state.temperature = (data[8] as i32 + 80 - 256) * 100;
        state.temperature2 = (data[9] as i32 + 80 - 256) * 100;
        state.battery_level = data[10] as i32;
        state.angle = le_i16(data, 11) as i32;
        state.roll = le_i16(data, 13) as i32;
        state.total_distance = le_u32(data, 15) as u64 * 10;
        state.update_power();
        true
    }

    fn parse_battery_real_time(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        if data.len() < 8 {
            return false;
        }
        self.bms1.voltage = le_u16(data, 0) as f64 / 100.0;
        self.bms1.current = le_i16(data, 2) as f64 / 100.0;
        self.bms1.soc = data[4];
        self.bms1.temperatures[0] = (data[5] as i32 + 80 - 256) as f64;
        self.bms1.temperatures[1] = (data[6] as i32 + 80 - 256) as f64;

        let cells = self.model.cell_count();
        self.bms1.ensure_cells(cells);
        for i in 0..cells {
            let offset = 8 + 2 * i;
            if offset + 2 > data.len() {
                break;
            }
            let millivolts = le_u16(data, offset);
            if millivolts != 0 {
                self.bms1.set_cell(i, millivolts as f64 / 1000.0);
            }
        }
        self.bms1.recompute();
        state.bms1 = Some(self.bms1.clone());
        true
    }

    fn parse_total_stats(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        if data.len() < 4 {
            return false;
        }
        state.total_distance = le_u32(data, 0) as u64 * 10;
        true
    }

    fn parse_settings(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        let layout = self.model.settings_layout();
        let (max_speed, tilt, mode_byte, sensitivity, speaker, brightness, flags) =
            layout.offsets();
        if data.len() <= flags {
            log::debug!(
                "inmotion v2: settings payload too short for {layout:?} ({} bytes)",
                data.len()
            );
            return false;
        }

        state.max_speed = le_u16(data, max_speed) as i32;
        state.pedals_adjustment = le_i16(data, tilt) as i32;

        let mode = data[mode_byte];
        match layout {
            SettingsLayout::V11 => {
                state.ride_mode = mode & 0x0F != 0;
            }
            SettingsLayout::V13 | SettingsLayout::V12 => {
                state.ride_mode = mode & 0x01 != 0 || mode & 0x10 != 0;
            }
            SettingsLayout::V11y => {
                state.ride_mode = mode != 0;
            }
        }
        state.comfort_sensitivity = data[sensitivity] as i32;
        state.classic_sensitivity = data[sensitivity + 1] as i32;
        if let Some(offset) = speaker {
            state.speaker_volume = data[offset] as i32;
        }
        if let Some(offset) = brightness {
            state.light_brightness = data[offset] as i32;
        }
        // Flag block: audio, DRL, handle-bar lock, transport, go-home, quiet fan.
        state.light_mode = (data[flags] & 0x02 != 0) as i32;
        true
    }

    fn dispatch(
        &mut self,
        body: &[u8],
        state: &mut WheelState,
        has_new_data: &mut bool,
    ) -> bool {
        // body = [flags, len, command, data...]
        let command = body[2];
        let data = &body[3..];
        match command {
            c if c == INMOTION_V2_CMD_MAIN_VERSION => {
                if data.len() >= 3 && self.version.is_empty() {
                    state.version = format!("{}.{}.{}", data[2], data[1], data[0]);
                    return true;
                }
                false
            }
            c if c == INMOTION_V2_CMD_MAIN_INFO => self.parse_main_info(data, state),
            c if c == INMOTION_V2_CMD_REAL_TIME => {
                let parsed = self.parse_real_time(data, state);
                *has_new_data |= parsed;
                parsed
            }
            c if c == INMOTION_V2_CMD_BATTERY_REAL_TIME => self.parse_battery_real_time(data, state),
            c if c == INMOTION_V2_CMD_TOTAL_STATS => self.parse_total_stats(data, state),
            c if c == INMOTION_V2_CMD_SETTINGS || c == INMOTION_V2_CMD_SETTINGS_RESPONSE => {
                self.parse_settings(data, state)
            }
            c if c == INMOTION_V2_CMD_CONTROL => {
                // Control acknowledgements carry no telemetry.
                false
            }
            other => {
                log::debug!("inmotion v2: ignoring command {other:#04x}");
                false
            }
        }
    }

    /// Lower a setting write into the control command.
    fn control_write(setting: u8, value: &[u8]) -> Vec<WheelCommand> {
        let mut data = Vec::with_capacity(1 + value.len());
        data.push(setting);
        data.extend_from_slice(value);
        vec![Self::request(INMOTION_V2_FLAG_DEFAULT, INMOTION_V2_CMD_CONTROL, &data)]
    }
}

impl Default for InmotionV2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for InmotionV2Decoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::InmotionV2
    }

    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData> {
        let _ = config;
        let mut state = previous.clone();
        let mut has_new_data = false;
        let mut changed = false;

        for &byte in data {
            if self.unpacker.add_byte(byte) {
                let body = self.unpacker.frame().to_vec();
                self.unpacker.reset();
                if body.len() >= 3 {
                    changed |= self.dispatch(&body, &mut state, &mut has_new_data);
                }
            }
        }

        if !changed {
            return None;
        }
        Some(DecodedData {
            state,
            commands: Vec::new(),
            has_new_data,
            news: None,
        })
    }

    fn is_ready(&self) -> bool {
        self.phase == Phase::Streaming
    }

    fn reset(&mut self) {
        self.unpacker.reset();
        self.phase = Phase::ModelUnknown;
        self.model = Model::Unknown;
        self.serial.clear();
        self.version.clear();
        self.bms1 = SmartBms::default();
    }

    fn init_commands(&self, _config: &DecoderConfig) -> Vec<WheelCommand> {
        let staged = [
            Self::car_type_request(),
            Self::serial_request(),
            Self::versions_request(),
            Self::settings_request(),
            Self::real_time_request(),
        ];
        staged
            .into_iter()
            .enumerate()
            .map(|(i, command)| {
                if i == 0 {
                    command
                } else {
                    WheelCommand::BytesWithDelay {
                        bytes: command.bytes().to_vec(),
                        delay_ms: 100 * i as u64,
                    }
                }
            })
            .collect()
    }

    fn keep_alive_command(&self, _config: &DecoderConfig) -> Option<WheelCommand> {
        Some(match self.phase {
            Phase::ModelUnknown => Self::car_type_request(),
            Phase::AwaitingSerial => Self::serial_request(),
            Phase::AwaitingVersions => Self::versions_request(),
            Phase::Streaming => Self::real_time_request(),
        })
    }

    fn keep_alive_interval_ms(&self) -> u64 {
        INMOTION_V2_KEEP_ALIVE_MS
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        match action {
            WheelAction::SetMaxSpeed(kmh) => {
                let value = (*kmh as u16 * 100).to_le_bytes();
                Self::control_write(0x01, &value)
            }
            WheelAction::SetPedalTilt(centi_degrees) => {
                Self::control_write(0x02, &centi_degrees.to_le_bytes())
            }
            WheelAction::LightOn => Self::control_write(0x03, &[1]),
            WheelAction::LightOff => Self::control_write(0x03, &[0]),
            WheelAction::SetLightBrightness(brightness) => {
                Self::control_write(0x04, &[*brightness])
            }
            WheelAction::SetSpeakerVolume(volume) => Self::control_write(0x05, &[*volume]),
            WheelAction::Beep => Self::control_write(0x06, &[1]),
            WheelAction::RequestSettings => vec![Self::settings_request()],
            WheelAction::RequestSerial => vec![Self::serial_request()],
            WheelAction::RequestName => vec![Self::car_type_request()],
            _ => Vec::new(),
        }
    }
}
