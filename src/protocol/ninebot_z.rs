//! # Ninebot-Z Decoder
//!
//! The Z-series keeps the Ninebot register model but moves behind a real
//! key exchange: the BLE module's key generator answers with 16 bytes that
//! replace the all-zero gamma, and from then on every frame in both
//! directions is XOR-rotated with it (the length byte stays clear).
//!
//! The connection is a 14-step ladder:
//!
//! ```text
//! INIT → WAIT_KEY → SERIAL → VERSION → PARAMS1 → PARAMS2 → PARAMS3
//!      → BMS1 {SN, LIFE, CELLS} → BMS2 {SN, LIFE, CELLS} → READY
//! ```
//!
//! re-driven by a 25 ms keep-alive that always requests the current rung.
//! The six BMS rungs only run when the caller enables `bms_reading_mode`;
//! otherwise PARAMS3 jumps straight to READY and the keep-alive settles on
//! live-data reads.

use bytes::{BufMut, BytesMut};

use crate::constants::{
    NINEBOT_CMD_READ, NINEBOT_CMD_READ_REPLY, NINEBOT_GAMMA_LEN, NINEBOT_REG_LIVE,
    NINEBOT_REG_SERIAL, NINEBOT_REG_VERSION, NINEBOT_Z_ADDR_APP, NINEBOT_Z_ADDR_BLE,
    NINEBOT_Z_ADDR_BMS1, NINEBOT_Z_ADDR_BMS2, NINEBOT_Z_ADDR_CONTROLLER,
    NINEBOT_Z_ADDR_KEY_GENERATOR, NINEBOT_Z_FRAME_OVERHEAD, NINEBOT_Z_HEADER,
    NINEBOT_Z_KEEP_ALIVE_MS, NINEBOT_Z_REG_BLE_VERSION, NINEBOT_Z_REG_BMS_CELLS,
    NINEBOT_Z_REG_BMS_LIFE, NINEBOT_Z_REG_BMS_SERIAL, NINEBOT_Z_REG_KEY, NINEBOT_Z_REG_PARAMS1,
    NINEBOT_Z_REG_PARAMS2, NINEBOT_Z_REG_PARAMS3,
};
use crate::decoder::{DecodedData, DecoderConfig, WheelAction, WheelCommand, WheelDecoder, WheelType};
use crate::protocol::ninebot::Gamma;
use crate::telemetry::{SmartBms, WheelState};
use crate::unpack::{NinebotUnpacker, Unpacker};
use crate::util::codec::{be_i16, le_i16, le_u16, le_u32};
use crate::util::crc::crc16_sum;
use crate::util::logging::{log_frame_hex, LogThrottle};

/// One decrypted, CRC-verified Ninebot-Z frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NinebotZMessage {
    pub source: u8,
    pub destination: u8,
    pub command: u8,
    pub parameter: u8,
    pub data: Vec<u8>,
}

/// Build an on-wire Z frame: plaintext body + CRC, gamma-encrypted past `len`.
pub fn build_frame(message: &NinebotZMessage, gamma: &Gamma) -> Vec<u8> {
    let mut region = BytesMut::with_capacity(message.data.len() + 7);
    region.put_u8(message.data.len() as u8);
    region.put_u8(message.source);
    region.put_u8(message.destination);
    region.put_u8(message.command);
    region.put_u8(message.parameter);
    region.put_slice(&message.data);
    let crc = crc16_sum(&region);
    region.put_u16_le(crc);
    gamma.apply(&mut region);

    let mut frame = BytesMut::with_capacity(region.len() + 2);
    frame.put_slice(&NINEBOT_Z_HEADER);
    frame.put_slice(&region);
    frame.to_vec()
}

/// Decrypt a complete Z frame and verify its CRC. `None` discards the frame.
pub fn open_frame(frame: &[u8], gamma: &Gamma) -> Option<NinebotZMessage> {
    if frame.len() < 2 + NINEBOT_Z_FRAME_OVERHEAD {
        return None;
    }
    let mut region = frame[2..].to_vec();
    gamma.apply(&mut region);

    let crc_pos = region.len() - 2;
    let received = le_u16(&region, crc_pos);
    let calculated = crc16_sum(&region[..crc_pos]);
    if received != calculated {
        log::debug!(
            "ninebot z: CRC mismatch, calculated {calculated:04x} received {received:04x}"
        );
        return None;
    }

    Some(NinebotZMessage {
        source: region[1],
        destination: region[2],
        command: region[3],
        parameter: region[4],
        data: region[5..crc_pos].to_vec(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    WaitKey,
    Serial,
    Version,
    Params1,
    Params2,
    Params3,
    Bms1Sn,
    Bms1Life,
    Bms1Cells,
    Bms2Sn,
    Bms2Life,
    Bms2Cells,
    Ready,
}

/// Stateful Ninebot-Z protocol decoder.
pub struct NinebotZDecoder {
    unpacker: NinebotUnpacker,
    gamma: Gamma,
    phase: Phase,
    ble_version: String,
    bms1: SmartBms,
    bms2: SmartBms,
    /// Rate limit for corrupt-frame logging; a stale gamma fails every CRC.
    throttle: LogThrottle,
}

impl NinebotZDecoder {
    pub fn new() -> Self {
        Self {
            unpacker: NinebotUnpacker::ninebot_z(),
            gamma: Gamma::new(),
            phase: Phase::Init,
            ble_version: String::new(),
            bms1: SmartBms::default(),
            bms2: SmartBms::default(),
            throttle: LogThrottle::per_second(5),
        }
    }

    /// Current gamma key bytes (handshake observability for hosts/tests).
    pub fn gamma_is_zero(&self) -> bool {
        self.gamma.is_zero()
    }

    /// BLE module firmware version, once the INIT probe has answered.
    pub fn ble_version(&self) -> &str {
        &self.ble_version
    }

    fn read_request(&self, destination: u8, register: u8, length: u8) -> WheelCommand {
        WheelCommand::Bytes(build_frame(
            &NinebotZMessage {
                source: NINEBOT_Z_ADDR_APP,
                destination,
                command: NINEBOT_CMD_READ,
                parameter: register,
                data: vec![length],
            },
            &self.gamma,
        ))
    }

    fn ascii(data: &[u8]) -> String {
        data.iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn nibble_version(raw: u16) -> String {
        format!("{}.{}.{}", (raw >> 8) & 0x0F, (raw >> 4) & 0x0F, raw & 0x0F)
    }

    /// Packed manufacturing date word: year offset from 2000 in the top
    /// bits, then month and day-of-month.
    fn manufacturing_date(raw: u16) -> String {
        format!(
            "{:04}/{:02}/{:02}",
            2000 + (raw >> 9),
            (raw >> 5) & 0x0F,
            raw & 0x1F
        )
    }

    fn advance(&mut self, from: Phase, to: Phase) {
        if self.phase == from {
            self.phase = to;
            log::debug!("ninebot z: connection step {from:?} -> {to:?}");
        }
    }

    fn after_params3(&self, config: &DecoderConfig) -> Phase {
        if config.bms_reading_mode {
            Phase::Bms1Sn
        } else {
            Phase::Ready
        }
    }

    fn parse_live_data(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        if data.len() < 30 {
            return false;
        }
        state.battery_level = le_u16(data, 2) as i32;
        state.speed = be_i16(data, 10) as i32 * 10;
        state.total_distance = le_u32(data, 14) as u64;
        state.temperature = le_i16(data, 22) as i32 * 10;
        state.voltage = le_u16(data, 24) as u32;
        state.current = le_i16(data, 26) as i32;
        state.update_power();
        true
    }

    fn parse_bms_serial(bms: &mut SmartBms, data: &[u8]) -> bool {
        if data.len() < 26 {
            return false;
        }
        bms.serial_number = Self::ascii(&data[0..14]);
        bms.factory_capacity = le_u16(data, 16) as u32;
        bms.remaining_capacity = le_u16(data, 18) as u32;
        bms.full_cycles = le_u16(data, 20) as u32;
        bms.charge_count = le_u16(data, 22) as u32;
        bms.manufacturing_date = Self::manufacturing_date(le_u16(data, 24));
        true
    }

    fn parse_bms_life(bms: &mut SmartBms, data: &[u8]) -> bool {
        if data.len() < 12 {
            return false;
        }
        bms.voltage = le_u16(data, 0) as f64 / 100.0;
        bms.current = le_i16(data, 2) as f64 / 100.0;
        bms.soc = le_u16(data, 4).min(100) as u8;
        bms.temperatures[0] = data[6] as f64 - 20.0;
        bms.temperatures[1] = data[7] as f64 - 20.0;
        bms.status = le_u16(data, 8);
        bms.balance_map = le_u16(data, 10) as u64;
        true
    }

    fn parse_bms_cells(bms: &mut SmartBms, data: &[u8]) -> bool {
        if data.len() < 32 {
            return false;
        }
        bms.ensure_cells(16);
        for i in 0..16 {
            let millivolts = le_u16(data, 2 * i);
            if millivolts != 0 {
                bms.set_cell(i, millivolts as f64 / 1000.0);
            }
        }
        bms.recompute();
        true
    }

    fn dispatch(
        &mut self,
        message: &NinebotZMessage,
        state: &mut WheelState,
        config: &DecoderConfig,
        has_new_data: &mut bool,
    ) -> bool {
        // The key generator can answer while we are still probing the BLE
        // version; accept it in either pre-key phase.
        if message.source == NINEBOT_Z_ADDR_KEY_GENERATOR
            && message.data.len() >= NINEBOT_GAMMA_LEN
        {
            self.gamma.replace(&message.data[..NINEBOT_GAMMA_LEN]);
            if matches!(self.phase, Phase::Init | Phase::WaitKey) {
                self.phase = Phase::Serial;
            }
            log::info!("ninebot z: gamma key installed");
            return false;
        }

        match (message.source, message.parameter) {
            (src, reg) if src == NINEBOT_Z_ADDR_BLE && reg == NINEBOT_Z_REG_BLE_VERSION => {
                if message.data.len() >= 2 {
                    self.ble_version = Self::nibble_version(le_u16(&message.data, 0));
                }
                self.advance(Phase::Init, Phase::WaitKey);
                false
            }
            (src, reg) if src == NINEBOT_Z_ADDR_CONTROLLER && reg == NINEBOT_REG_SERIAL => {
                state.serial_number = Self::ascii(&message.data);
                self.advance(Phase::Serial, Phase::Version);
                true
            }
            (src, reg) if src == NINEBOT_Z_ADDR_CONTROLLER && reg == NINEBOT_REG_VERSION => {
                if message.data.len() < 2 {
                    return false;
                }
                state.version = Self::nibble_version(le_u16(&message.data, 0));
                self.advance(Phase::Version, Phase::Params1);
                true
            }
            (src, reg) if src == NINEBOT_Z_ADDR_CONTROLLER && reg == NINEBOT_Z_REG_PARAMS1 => {
                if message.data.len() >= 8 {
                    state.speed_limit = le_u16(&message.data, 0) as i32 * 10;
                    state.alarm1_speed = le_u16(&message.data, 2) as i32 / 10;
                    state.alarm2_speed = le_u16(&message.data, 4) as i32 / 10;
                    state.alarm3_speed = le_u16(&message.data, 6) as i32 / 10;
                }
                self.advance(Phase::Params1, Phase::Params2);
                true
            }
            (src, reg) if src == NINEBOT_Z_ADDR_CONTROLLER && reg == NINEBOT_Z_REG_PARAMS2 => {
                if message.data.len() >= 2 {
                    state.comfort_sensitivity = message.data[0] as i32;
                    state.classic_sensitivity = message.data[1] as i32;
                }
                self.advance(Phase::Params2, Phase::Params3);
                true
            }
            (src, reg) if src == NINEBOT_Z_ADDR_CONTROLLER && reg == NINEBOT_Z_REG_PARAMS3 => {
                if message.data.len() >= 2 {
                    state.auto_off_sec = le_u16(&message.data, 0) as i32;
                }
                let next = self.after_params3(config);
                self.advance(Phase::Params3, next);
                true
            }
            (src, reg) if src == NINEBOT_Z_ADDR_CONTROLLER && reg == NINEBOT_REG_LIVE => {
                let parsed = self.parse_live_data(&message.data, state);
                *has_new_data |= parsed;
                parsed
            }
            (src, reg)
                if (src == NINEBOT_Z_ADDR_BMS1 || src == NINEBOT_Z_ADDR_BMS2)
                    && reg == NINEBOT_Z_REG_BMS_SERIAL =>
            {
                let second = src == NINEBOT_Z_ADDR_BMS2;
                let bms = if second { &mut self.bms2 } else { &mut self.bms1 };
                let parsed = Self::parse_bms_serial(bms, &message.data);
                if parsed {
                    if second {
                        state.bms2 = Some(self.bms2.clone());
                        self.advance(Phase::Bms2Sn, Phase::Bms2Life);
                    } else {
                        state.bms1 = Some(self.bms1.clone());
                        self.advance(Phase::Bms1Sn, Phase::Bms1Life);
                    }
                }
                parsed
            }
            (src, reg)
                if (src == NINEBOT_Z_ADDR_BMS1 || src == NINEBOT_Z_ADDR_BMS2)
                    && reg == NINEBOT_Z_REG_BMS_LIFE =>
            {
                let second = src == NINEBOT_Z_ADDR_BMS2;
                let bms = if second { &mut self.bms2 } else { &mut self.bms1 };
                let parsed = Self::parse_bms_life(bms, &message.data);
                if parsed {
                    if second {
                        state.bms2 = Some(self.bms2.clone());
                        self.advance(Phase::Bms2Life, Phase::Bms2Cells);
                    } else {
                        state.bms1 = Some(self.bms1.clone());
                        self.advance(Phase::Bms1Life, Phase::Bms1Cells);
                    }
                }
                parsed
            }
            (src, reg)
                if (src == NINEBOT_Z_ADDR_BMS1 || src == NINEBOT_Z_ADDR_BMS2)
                    && reg == NINEBOT_Z_REG_BMS_CELLS =>
            {
                let second = src == NINEBOT_Z_ADDR_BMS2;
                let bms = if second { &mut self.bms2 } else { &mut self.bms1 };
                let parsed = Self::parse_bms_cells(bms, &message.data);
                if parsed {
                    if second {
                        state.bms2 = Some(self.bms2.clone());
                        self.advance(Phase::Bms2Cells, Phase::Ready);
                    } else {
                        state.bms1 = Some(self.bms1.clone());
                        self.advance(Phase::Bms1Cells, Phase::Bms2Sn);
                    }
                }
                parsed
            }
            (_, other) => {
                log::debug!("ninebot z: ignoring register {other:#04x}");
                false
            }
        }
    }
}

impl Default for NinebotZDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for NinebotZDecoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::NinebotZ
    }

    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData> {
        let mut state = previous.clone();
        let mut has_new_data = false;
        let mut changed = false;

        for &byte in data {
            if self.unpacker.add_byte(byte) {
                let frame = self.unpacker.frame().to_vec();
                self.unpacker.reset();
                if let Some(message) = open_frame(&frame, &self.gamma) {
                    changed |= self.dispatch(&message, &mut state, config, &mut has_new_data);
                } else if self.throttle.allow() {
                    log_frame_hex("ninebot z: discarding corrupt frame", &frame);
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
        self.phase == Phase::Ready
    }

    fn reset(&mut self) {
        self.unpacker.reset();
        self.gamma = Gamma::new();
        self.phase = Phase::Init;
        self.ble_version.clear();
        self.bms1 = SmartBms::default();
        self.bms2 = SmartBms::default();
    }

    fn keep_alive_command(&self, config: &DecoderConfig) -> Option<WheelCommand> {
        let _ = config;
        Some(match self.phase {
            Phase::Init => self.read_request(NINEBOT_Z_ADDR_BLE, NINEBOT_Z_REG_BLE_VERSION, 2),
            Phase::WaitKey => self.read_request(
                NINEBOT_Z_ADDR_KEY_GENERATOR,
                NINEBOT_Z_REG_KEY,
                NINEBOT_GAMMA_LEN as u8,
            ),
            Phase::Serial => self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_REG_SERIAL, 14),
            Phase::Version => self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_REG_VERSION, 2),
            Phase::Params1 => self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_Z_REG_PARAMS1, 32),
            Phase::Params2 => self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_Z_REG_PARAMS2, 32),
            Phase::Params3 => self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_Z_REG_PARAMS3, 32),
            Phase::Bms1Sn => self.read_request(NINEBOT_Z_ADDR_BMS1, NINEBOT_Z_REG_BMS_SERIAL, 34),
            Phase::Bms1Life => self.read_request(NINEBOT_Z_ADDR_BMS1, NINEBOT_Z_REG_BMS_LIFE, 24),
            Phase::Bms1Cells => self.read_request(NINEBOT_Z_ADDR_BMS1, NINEBOT_Z_REG_BMS_CELLS, 32),
            Phase::Bms2Sn => self.read_request(NINEBOT_Z_ADDR_BMS2, NINEBOT_Z_REG_BMS_SERIAL, 34),
            Phase::Bms2Life => self.read_request(NINEBOT_Z_ADDR_BMS2, NINEBOT_Z_REG_BMS_LIFE, 24),
            Phase::Bms2Cells => self.read_request(NINEBOT_Z_ADDR_BMS2, NINEBOT_Z_REG_BMS_CELLS, 32),
            Phase::Ready => self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_REG_LIVE, 32),
        })
    }

    fn keep_alive_interval_ms(&self) -> u64 {
        NINEBOT_Z_KEEP_ALIVE_MS
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        match action {
            WheelAction::RequestSerial => {
                vec![self.read_request(NINEBOT_Z_ADDR_CONTROLLER, NINEBOT_REG_SERIAL, 14)]
            }
            _ => Vec::new(),
        }
    }
}
