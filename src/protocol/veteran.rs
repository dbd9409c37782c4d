//! # Veteran / Leaperkim Decoder
//!
//! Veteran boards stream immediately, no handshake: one frame carries the
//! whole telemetry block at fixed big-endian offsets, with the 32-bit
//! distance counters stored low-word-first. The firmware word doubles as the
//! model id (`mVer = ver / 1000`), which selects the battery-curve class and
//! the smart-BMS cell count.
//!
//! Boards with `mVer >= 5` append smart-BMS slices behind the standard
//! block, keyed by a packet-index byte: values `0..=3` address pack one,
//! `4..=7` pack two, and the slice number within the pack selects current,
//! or one of three cell-voltage windows (the last one with the temperature
//! block). The first cell window reads *signed* 16-bit values, a firmware
//! quirk kept as-is.

use std::sync::Arc;

use crate::constants::VETERAN_STALE_MS;
use crate::decoder::{
    DecodedData, DecoderConfig, MonotonicClock, SystemClock, WheelAction, WheelCommand,
    WheelDecoder, WheelType,
};
use crate::telemetry::{SmartBms, WheelState};
use crate::unpack::{Unpacker, VeteranUnpacker};
use crate::util::codec::{be_i16, be_u16, be_u32_word_swapped, round_half_away};

/// Battery-curve class by pack cell count; the knee values are the 24s
/// Sherman curve scaled by cells/24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatteryClass {
    Volts100,
    Volts126,
    Volts151,
    Volts176,
}

impl BatteryClass {
    fn scale(self) -> f64 {
        match self {
            BatteryClass::Volts100 => 1.0,
            BatteryClass::Volts126 => 1.25,
            BatteryClass::Volts151 => 1.5,
            BatteryClass::Volts176 => 1.75,
        }
    }

    fn for_model(m_ver: u16) -> Self {
        match m_ver {
            0..=3 => BatteryClass::Volts100,
            4 | 7 | 43 => BatteryClass::Volts126,
            5 | 6 | 42 => BatteryClass::Volts151,
            8 => BatteryClass::Volts176,
            _ => BatteryClass::Volts100,
        }
    }
}

/// Stateful Veteran/Leaperkim protocol decoder.
pub struct VeteranDecoder {
    unpacker: VeteranUnpacker,
    clock: Arc<dyn MonotonicClock>,
    last_ingest_ms: Option<u64>,
    m_ver: u16,
    ready: bool,
    bms1: SmartBms,
    bms2: SmartBms,
}

impl VeteranDecoder {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Inject a clock; tests step it to exercise the stale-frame guard.
    pub fn with_clock(clock: Arc<dyn MonotonicClock>) -> Self {
        Self {
            unpacker: VeteranUnpacker::new(),
            clock,
            last_ingest_ms: None,
            m_ver: 0,
            ready: false,
            bms1: SmartBms::default(),
            bms2: SmartBms::default(),
        }
    }

    fn model_name(m_ver: u16) -> &'static str {
        match m_ver {
            0 | 1 => "Sherman",
            2 => "Abrams",
            3 => "Sherman S",
            4 => "Patton",
            5 => "Lynx",
            6 => "Sherman L",
            7 => "Patton S",
            8 => "Oryx",
            42 => "Nosfet Apex",
            43 => "Nosfet Aero",
            _ => "Veteran",
        }
    }

    fn cell_count(m_ver: u16) -> usize {
        match m_ver {
            4 | 7 | 43 => 30,
            8 => 42,
            m if m >= 5 => 36,
            _ => 24,
        }
    }

    fn battery_level(m_ver: u16, voltage: u32, better_percents: bool) -> i32 {
        let k = BatteryClass::for_model(m_ver).scale();
        let v = voltage as f64;
        if better_percents {
            if v > 10020.0 * k {
                100
            } else if v > 8160.0 * k {
                round_half_away((v - 8070.0 * k) / (19.5 * k)) as i32
            } else {
                0
            }
        } else if v <= 7935.0 * k {
            0
        } else if v >= 9870.0 * k {
            100
        } else {
            round_half_away((v - 7935.0 * k) / (19.35 * k)) as i32
        }
    }

    fn parse_frame(&mut self, frame: &[u8], state: &mut WheelState, config: &DecoderConfig) -> bool {
        if frame.len() < 36 {
            return false;
        }

        let ver = be_u16(frame, 28);
        self.m_ver = ver / 1000;
        self.ready = true;

        state.voltage = be_u16(frame, 4) as u32;
        state.speed = config.apply_polarity(be_i16(frame, 6) as i32 * 10);
        state.wheel_distance = be_u32_word_swapped(frame, 8) as u64;
        state.total_distance = be_u32_word_swapped(frame, 12) as u64;
        state.phase_current = config.apply_polarity(be_i16(frame, 16) as i32 * 10);
        state.temperature = be_i16(frame, 18) as i32;
        state.auto_off_sec = be_u16(frame, 20) as i32;
        state.charge_mode = be_u16(frame, 22) as i32;
        state.speed_alert = be_u16(frame, 24) as i32 * 10;
        state.tilt_back_speed = be_u16(frame, 26) as i32 * 10;
        state.pedals_mode = be_u16(frame, 30) as i32;
        state.angle = be_i16(frame, 32) as i32;

        state.version = format!("{}.{}.{}", ver / 1000, ver % 1000 / 100, ver % 100);
        state.model = Self::model_name(self.m_ver).to_string();
        state.battery_level =
            Self::battery_level(self.m_ver, state.voltage, config.use_better_percents);

        let hw_pwm = config.apply_polarity(be_i16(frame, 34) as i32);
        if config.hw_pwm_enabled {
            state.output = hw_pwm;
            state.calculated_pwm = hw_pwm as f64 / 10000.0;
        } else {
            let rotation = config.rotation_speed / config.rotation_voltage
                * state.voltage as f64
                * config.power_factor;
            state.calculated_pwm = if rotation != 0.0 {
                state.speed as f64 / rotation
            } else {
                0.0
            };
            state.output = round_half_away(state.calculated_pwm * 10000.0) as i32;
        }
        state.current = round_half_away(state.calculated_pwm * state.phase_current as f64) as i32;
        state.update_power();

        if self.m_ver >= 5 && frame.len() > 46 {
            self.parse_bms_slice(frame, state);
        }
        true
    }

    /// Smart-BMS slice behind the standard block. `p_num` 0..=3 is pack one,
    /// 4..=7 pack two; slice index within the pack selects the content.
    fn parse_bms_slice(&mut self, frame: &[u8], state: &mut WheelState) {
        let p_num = frame[46];
        if p_num > 7 {
            return;
        }
        let cells = Self::cell_count(self.m_ver);
        let second_pack = p_num >= 4;
        let bms = if second_pack { &mut self.bms2 } else { &mut self.bms1 };
        bms.ensure_cells(cells);

        match p_num % 4 {
            0 => {
                if frame.len() >= 51 {
                    bms.voltage = be_u16(frame, 47) as f64 / 100.0;
                    bms.current = be_i16(frame, 49) as f64 / 10.0;
                }
            }
            1 => {
                // Cells 0..=14; this window reads signed on the wire.
                for i in 0..15 {
                    let offset = 47 + 2 * i;
                    if offset + 2 > frame.len() {
                        break;
                    }
                    let millivolts = be_i16(frame, offset);
                    if millivolts > 0 {
                        bms.set_cell(i, millivolts as f64 / 1000.0);
                    }
                }
            }
            2 => {
                for i in 0..15 {
                    let offset = 47 + 2 * i;
                    if offset + 2 > frame.len() || 15 + i >= cells {
                        break;
                    }
                    let millivolts = be_u16(frame, offset);
                    if millivolts != 0 {
                        bms.set_cell(15 + i, millivolts as f64 / 1000.0);
                    }
                }
            }
            _ => {
                for i in 0..12 {
                    let offset = 47 + 2 * i;
                    if offset + 2 > frame.len() || 30 + i >= cells {
                        break;
                    }
                    let millivolts = be_u16(frame, offset);
                    if millivolts != 0 {
                        bms.set_cell(30 + i, millivolts as f64 / 1000.0);
                    }
                }
                for j in 0..6 {
                    let offset = 47 + 24 + 2 * j;
                    if offset + 2 > frame.len() {
                        break;
                    }
                    bms.temperatures[j] = be_i16(frame, offset) as f64 / 100.0;
                }
            }
        }
        bms.recompute();
        if second_pack {
            state.bms2 = Some(self.bms2.clone());
        } else {
            state.bms1 = Some(self.bms1.clone());
        }
    }
}

impl Default for VeteranDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for VeteranDecoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::Veteran
    }

    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData> {
        let now = self.clock.now_millis();
        if let Some(last) = self.last_ingest_ms {
            if now.saturating_sub(last) > VETERAN_STALE_MS {
                log::debug!("veteran: {}ms since last bytes, dropping partial frame", now - last);
                self.unpacker.reset();
            }
        }
        self.last_ingest_ms = Some(now);

        let mut state = previous.clone();
        let mut has_new_data = false;

        for &byte in data {
            if self.unpacker.add_byte(byte) {
                let frame = self.unpacker.frame().to_vec();
                self.unpacker.reset();
                has_new_data |= self.parse_frame(&frame, &mut state, config);
            }
        }

        if !has_new_data {
            return None;
        }
        state.news = String::new();
        Some(DecodedData {
            state,
            commands: Vec::new(),
            has_new_data,
            news: None,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn reset(&mut self) {
        self.unpacker.reset();
        self.unpacker.clear_latch();
        self.last_ingest_ms = None;
        self.m_ver = 0;
        self.ready = false;
        self.bms1 = SmartBms::default();
        self.bms2 = SmartBms::default();
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        match action {
            WheelAction::Beep => vec![WheelCommand::Bytes(b"b".to_vec())],
            WheelAction::LightOn => vec![WheelCommand::Bytes(b"SetLightON".to_vec())],
            WheelAction::LightOff => vec![WheelCommand::Bytes(b"SetLightOFF".to_vec())],
            _ => Vec::new(),
        }
    }
}
