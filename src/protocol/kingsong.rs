//! # Kingsong Decoder
//!
//! Kingsong wheels speak little-endian 20-byte frames and expect the app to
//! pull identity with typed requests (name, serial, alarm settings) right
//! after connecting. One frame type is special: when the wheel pushes new
//! alarm settings (0xA4) the decoder MUST answer with a 0x98-framed
//! acknowledgement echoing the stored alarm/max-speed values, or the wheel
//! keeps re-pushing.

use crate::constants::{
    KINGSONG_FRAME_ALARM_PUSH, KINGSONG_FRAME_BMS1, KINGSONG_FRAME_BMS2, KINGSONG_FRAME_CPU,
    KINGSONG_FRAME_DISTANCE_TIME_FAN, KINGSONG_FRAME_LIVE, KINGSONG_FRAME_MAX_SPEED_ALERTS,
    KINGSONG_FRAME_NAME, KINGSONG_FRAME_SERIAL, KINGSONG_FRAME_SPEED_LIMIT,
    KINGSONG_FRAME_TYPE_OFFSET, KINGSONG_HEADER_0, KINGSONG_HEADER_1, KINGSONG_REQ_ALARMS,
    KINGSONG_REQ_NAME, KINGSONG_REQ_SERIAL, KINGSONG_TAIL,
};
use crate::decoder::{DecodedData, DecoderConfig, WheelAction, WheelCommand, WheelDecoder, WheelType};
use crate::telemetry::{SmartBms, WheelState};
use crate::unpack::{KingsongUnpacker, Unpacker};
use crate::util::codec::{le_i16, le_u16, le_u32, round_half_away};

/// Build a 20-byte framed Kingsong packet with the given type byte.
fn build_frame(frame_type: u8, fill: impl FnOnce(&mut [u8; 20])) -> Vec<u8> {
    let mut frame = [0u8; 20];
    frame[0] = KINGSONG_HEADER_0;
    frame[1] = KINGSONG_HEADER_1;
    frame[KINGSONG_FRAME_TYPE_OFFSET] = frame_type;
    frame[17] = KINGSONG_TAIL;
    frame[18] = 0x5A;
    frame[19] = 0x5A;
    fill(&mut frame);
    frame.to_vec()
}

/// Stateful Kingsong protocol decoder.
pub struct KingsongDecoder {
    unpacker: KingsongUnpacker,
    model: String,
    serial: String,
    // Stored alarm settings, echoed back in the 0x98 acknowledgement.
    alarm1: u8,
    alarm2: u8,
    alarm3: u8,
    max_speed: u8,
    bms1: SmartBms,
    bms2: SmartBms,
}

impl KingsongDecoder {
    pub fn new() -> Self {
        Self {
            unpacker: KingsongUnpacker::new(),
            model: String::new(),
            serial: String::new(),
            alarm1: 0,
            alarm2: 0,
            alarm3: 0,
            max_speed: 0,
            bms1: SmartBms::default(),
            bms2: SmartBms::default(),
        }
    }

    /// 84 V packs span 62.5..82.5 V, 126 V packs 93.75..123.75 V. The class
    /// is picked from the reading itself; an 84 V pack can never reach the
    /// 126 V floor.
    fn battery_level(voltage: u32) -> i32 {
        let (zero, full) = if voltage > 9000 { (9375, 12375) } else { (6250, 8250) };
        if voltage <= zero {
            0
        } else if voltage >= full {
            100
        } else {
            round_half_away((voltage - zero) as f64 * 100.0 / (full - zero) as f64) as i32
        }
    }

    fn parse_live(&mut self, frame: &[u8], state: &mut WheelState) {
        state.voltage = le_u16(frame, 2) as u32;
        state.speed = le_u16(frame, 4) as i32;
        state.total_distance = le_u32(frame, 6) as u64;
        state.current = le_i16(frame, 10) as i32;
        state.temperature = le_i16(frame, 12) as i32;
        state.mode_str = format!("{}", frame[15]);
        state.battery_level = Self::battery_level(state.voltage);
        state.update_power();
    }

    fn parse_distance_time_fan(&mut self, frame: &[u8], state: &mut WheelState) {
        state.wheel_distance = le_u32(frame, 2) as u64;
        state.fan_status = frame[12] as i32;
        state.temperature2 = frame[13] as i32 * 100;
    }

    fn parse_name(&mut self, frame: &[u8], state: &mut WheelState) {
        let name: String = frame[2..16]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        let name = name.trim().to_string();

        // Version travels as the trailing four digits of the name record.
        let digits: String = name
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if digits.len() >= 4 {
            let tail = &digits[digits.len() - 4..];
            state.version = format!("{}.{}", &tail[..2], &tail[2..]);
            self.model = name[..name.len() - tail.len()]
                .trim_end_matches('-')
                .trim()
                .to_string();
        } else {
            self.model = name;
        }
        state.model = self.model.clone();
    }

    fn parse_serial(&mut self, frame: &[u8], state: &mut WheelState) {
        let mut serial: String = frame[2..16]
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        serial.extend(frame[17..20].iter().filter(|&&b| b != 0).map(|&b| b as char));
        self.serial = serial.trim().to_string();
        state.serial_number = self.serial.clone();
    }

    fn parse_alarms(&mut self, frame: &[u8], state: &mut WheelState) {
        self.alarm1 = frame[4];
        self.alarm2 = frame[6];
        self.alarm3 = frame[8];
        self.max_speed = frame[10];
        state.alarm1_speed = self.alarm1 as i32;
        state.alarm2_speed = self.alarm2 as i32;
        state.alarm3_speed = self.alarm3 as i32;
        state.max_speed = self.max_speed as i32 * 100;

        let tilt_back = frame[10] as i32;
        state.tilt_back_speed = if tilt_back >= 100 { 0 } else { tilt_back * 100 };
    }

    /// The 0x98 acknowledgement the wheel expects after an 0xA4 push.
    fn alarm_ack(&self) -> WheelCommand {
        let (alarm1, alarm2, alarm3, max_speed) =
            (self.alarm1, self.alarm2, self.alarm3, self.max_speed);
        WheelCommand::Bytes(build_frame(KINGSONG_REQ_ALARMS, move |frame| {
            frame[4] = alarm1;
            frame[6] = alarm2;
            frame[8] = alarm3;
            frame[10] = max_speed;
        }))
    }

    fn parse_cpu(&mut self, frame: &[u8], state: &mut WheelState) {
        state.cpu_load = frame[14] as i32;
        state.output = frame[15] as i32 * 100;
        state.calculated_pwm = state.output as f64 / 10000.0;
    }

    /// BMS slice frames; byte 17 replaces the usual tail with a packet index.
    fn parse_bms(&mut self, frame: &[u8], second_pack: bool, state: &mut WheelState) {
        let p_num = frame[17];
        let bms = if second_pack { &mut self.bms2 } else { &mut self.bms1 };

        match p_num {
            0x00 => {
                bms.voltage = le_u16(frame, 2) as f64 / 100.0;
                bms.current = le_i16(frame, 4) as f64 / 100.0;
                bms.remaining_capacity = le_u16(frame, 6) as u32 * 10;
                bms.factory_capacity = le_u16(frame, 8) as u32 * 10;
                bms.full_cycles = le_u16(frame, 10) as u32;
            }
            0x01..=0x04 => {
                let base = (p_num as usize - 1) * 8;
                for i in 0..8 {
                    let millivolts = le_u16(frame, 2 + 2 * i);
                    if millivolts != 0 {
                        bms.set_cell(base + i, millivolts as f64 / 1000.0);
                    }
                }
                bms.recompute();
            }
            0x05 => {
                // Temperatures arrive in deci-kelvin style: (raw - 2730) / 10 °C.
                for j in 0..6 {
                    let raw = le_i16(frame, 2 + 2 * j);
                    if raw != 0 {
                        bms.temperatures[j] = (raw - 2730) as f64 / 10.0;
                    }
                }
            }
            0x06 => {
                bms.soc = frame[2];
                bms.balance_map = le_u16(frame, 4) as u64;
                bms.status = le_u16(frame, 6);
            }
            _ => {}
        }

        if second_pack {
            state.bms2 = Some(self.bms2.clone());
        } else {
            state.bms1 = Some(self.bms1.clone());
        }
    }

    fn parse_frame(
        &mut self,
        frame: &[u8],
        state: &mut WheelState,
        commands: &mut Vec<WheelCommand>,
        has_new_data: &mut bool,
    ) -> bool {
        match frame[KINGSONG_FRAME_TYPE_OFFSET] {
            t if t == KINGSONG_FRAME_LIVE => {
                self.parse_live(frame, state);
                *has_new_data = true;
                true
            }
            t if t == KINGSONG_FRAME_DISTANCE_TIME_FAN => {
                self.parse_distance_time_fan(frame, state);
                true
            }
            t if t == KINGSONG_FRAME_NAME => {
                self.parse_name(frame, state);
                true
            }
            t if t == KINGSONG_FRAME_SERIAL => {
                self.parse_serial(frame, state);
                true
            }
            t if t == KINGSONG_FRAME_MAX_SPEED_ALERTS => {
                self.parse_alarms(frame, state);
                true
            }
            t if t == KINGSONG_FRAME_ALARM_PUSH => {
                self.parse_alarms(frame, state);
                commands.push(self.alarm_ack());
                true
            }
            t if t == KINGSONG_FRAME_CPU => {
                self.parse_cpu(frame, state);
                true
            }
            t if t == KINGSONG_FRAME_SPEED_LIMIT => {
                state.speed_limit = le_u16(frame, 2) as i32;
                true
            }
            t if t == KINGSONG_FRAME_BMS1 => {
                self.parse_bms(frame, false, state);
                true
            }
            t if t == KINGSONG_FRAME_BMS2 => {
                self.parse_bms(frame, true, state);
                true
            }
            other => {
                log::debug!("kingsong: ignoring frame type {other:#04x}");
                false
            }
        }
    }
}

impl Default for KingsongDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for KingsongDecoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::Kingsong
    }

    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData> {
        let _ = config;
        let mut state = previous.clone();
        let mut commands = Vec::new();
        let mut has_new_data = false;
        let mut changed = false;

        for &byte in data {
            if self.unpacker.add_byte(byte) {
                let frame = self.unpacker.frame().to_vec();
                self.unpacker.reset();
                changed |= self.parse_frame(&frame, &mut state, &mut commands, &mut has_new_data);
            }
        }

        if !changed && commands.is_empty() {
            return None;
        }
        Some(DecodedData {
            state,
            commands,
            has_new_data,
            news: None,
        })
    }

    fn is_ready(&self) -> bool {
        !self.model.is_empty() && !self.serial.is_empty()
    }

    fn reset(&mut self) {
        self.unpacker.reset();
        self.model.clear();
        self.serial.clear();
        self.alarm1 = 0;
        self.alarm2 = 0;
        self.alarm3 = 0;
        self.max_speed = 0;
        self.bms1 = SmartBms::default();
        self.bms2 = SmartBms::default();
    }

    fn init_commands(&self, _config: &DecoderConfig) -> Vec<WheelCommand> {
        vec![
            WheelCommand::Bytes(build_frame(KINGSONG_REQ_NAME, |_| {})),
            WheelCommand::BytesWithDelay {
                bytes: build_frame(KINGSONG_REQ_SERIAL, |_| {}),
                delay_ms: 100,
            },
            WheelCommand::BytesWithDelay {
                bytes: build_frame(KINGSONG_REQ_ALARMS, |_| {}),
                delay_ms: 200,
            },
        ]
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        match action {
            WheelAction::RequestName => vec![WheelCommand::Bytes(build_frame(KINGSONG_REQ_NAME, |_| {}))],
            WheelAction::RequestSerial => {
                vec![WheelCommand::Bytes(build_frame(KINGSONG_REQ_SERIAL, |_| {}))]
            }
            WheelAction::RequestSettings => {
                vec![WheelCommand::Bytes(build_frame(KINGSONG_REQ_ALARMS, |_| {}))]
            }
            WheelAction::SetAlarms {
                alarm1,
                alarm2,
                alarm3,
                max_speed,
            } => {
                let (a1, a2, a3, ms) = (*alarm1, *alarm2, *alarm3, *max_speed);
                vec![WheelCommand::Bytes(build_frame(0x85, move |frame| {
                    frame[4] = a1;
                    frame[6] = a2;
                    frame[8] = a3;
                    frame[10] = ms;
                }))]
            }
            WheelAction::Beep => vec![WheelCommand::Bytes(build_frame(0x88, |_| {}))],
            WheelAction::LightOn => vec![WheelCommand::Bytes(build_frame(0x73, |frame| {
                frame[2] = 0x01;
            }))],
            WheelAction::LightOff => vec![WheelCommand::Bytes(build_frame(0x73, |frame| {
                frame[2] = 0x00;
            }))],
            WheelAction::PowerOff => vec![WheelCommand::Bytes(build_frame(0x40, |_| {}))],
            _ => Vec::new(),
        }
    }
}
