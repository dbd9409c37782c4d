//! # Ninebot Decoder (DEFAULT / S2 / MINI)
//!
//! Ninebot frames are register reads over a CAN-like bus: the app asks a
//! bus address for a register, the wheel answers with the register number
//! as the frame parameter. Everything past the length byte is XOR-encrypted
//! with a 16-byte gamma key (all zeros on this generation, so an identity
//! transform, replaced by a handshake on Ninebot-Z) and protected by the
//! firmware's "CRC16": sum of the plaintext bytes XOR 0xFFFF.
//!
//! Connection walks `WAIT_SERIAL → WAIT_VERSION → READY`, re-requesting the
//! current target every 125 ms. The serial number answers as up to three
//! register chunks (0x10, 0x13, 0x16) that concatenate in register order.

use bytes::{BufMut, BytesMut};

use crate::constants::{
    NINEBOT_ADDR_APP, NINEBOT_ADDR_ESC, NINEBOT_CMD_READ, NINEBOT_GAMMA_LEN, NINEBOT_HEADER,
    NINEBOT_KEEP_ALIVE_MS, NINEBOT_REG_LIVE, NINEBOT_REG_LIVE_EXTRA, NINEBOT_REG_SERIAL,
    NINEBOT_REG_SERIAL_2, NINEBOT_REG_SERIAL_3, NINEBOT_REG_VERSION,
};
use crate::decoder::{
    DecodedData, DecoderConfig, NinebotVariant, WheelAction, WheelCommand, WheelDecoder, WheelType,
};
use crate::telemetry::WheelState;
use crate::unpack::{NinebotUnpacker, Unpacker};
use crate::util::codec::{be_i16, be_u16, le_i16, le_u16, le_u32};
use crate::util::crc::crc16_sum;
use crate::util::logging::{log_frame_hex, LogThrottle};

/// The rotating XOR key shared by both Ninebot generations.
///
/// All-zero until a key-generator response replaces it, which makes every
/// transform before the handshake an identity operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gamma([u8; NINEBOT_GAMMA_LEN]);

impl Gamma {
    pub fn new() -> Self {
        Self([0u8; NINEBOT_GAMMA_LEN])
    }

    pub fn replace(&mut self, key: &[u8]) {
        let take = key.len().min(NINEBOT_GAMMA_LEN);
        self.0[..take].copy_from_slice(&key[..take]);
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// XOR-transform an encrypted region in place. `region[0]` is the length
    /// byte and stays clear; byte `j >= 1` pairs with `gamma[(j - 1) % 16]`.
    pub fn apply(&self, region: &mut [u8]) {
        for (j, byte) in region.iter_mut().enumerate().skip(1) {
            *byte ^= self.0[(j - 1) % NINEBOT_GAMMA_LEN];
        }
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Self::new()
    }
}

/// One decrypted, CRC-verified Ninebot frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NinebotMessage {
    pub source: u8,
    pub destination: u8,
    pub parameter: u8,
    pub data: Vec<u8>,
}

/// Build an on-wire frame: plaintext body + CRC, gamma-encrypted past `len`.
pub fn build_frame(message: &NinebotMessage, gamma: &Gamma) -> Vec<u8> {
    let mut region = BytesMut::with_capacity(message.data.len() + 6);
    region.put_u8(message.data.len() as u8);
    region.put_u8(message.source);
    region.put_u8(message.destination);
    region.put_u8(message.parameter);
    region.put_slice(&message.data);
    let crc = crc16_sum(&region);
    region.put_u16_le(crc);
    gamma.apply(&mut region);

    let mut frame = BytesMut::with_capacity(region.len() + 2);
    frame.put_slice(&NINEBOT_HEADER);
    frame.put_slice(&region);
    frame.to_vec()
}

/// Decrypt a complete frame and verify its CRC. `None` discards the frame.
pub fn open_frame(frame: &[u8], gamma: &Gamma) -> Option<NinebotMessage> {
    if frame.len() < 8 {
        return None;
    }
    let mut region = frame[2..].to_vec();
    gamma.apply(&mut region);

    let crc_pos = region.len() - 2;
    let received = le_u16(&region, crc_pos);
    let calculated = crc16_sum(&region[..crc_pos]);
    if received != calculated {
        log::debug!("ninebot: CRC mismatch, calculated {calculated:04x} received {received:04x}");
        return None;
    }

    Some(NinebotMessage {
        source: region[1],
        destination: region[2],
        parameter: region[3],
        data: region[4..crc_pos].to_vec(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitSerial,
    WaitVersion,
    Ready,
}

/// Stateful Ninebot protocol decoder.
pub struct NinebotDecoder {
    unpacker: NinebotUnpacker,
    gamma: Gamma,
    phase: Phase,
    serial_parts: [Option<String>; 3],
    /// Rate limit for corrupt-frame logging; a wrong gamma fails every CRC.
    throttle: LogThrottle,
}

impl NinebotDecoder {
    pub fn new() -> Self {
        Self {
            unpacker: NinebotUnpacker::new(),
            gamma: Gamma::new(),
            phase: Phase::WaitSerial,
            serial_parts: [None, None, None],
            throttle: LogThrottle::per_second(5),
        }
    }

    fn read_request(&self, register: u8, length: u8) -> WheelCommand {
        WheelCommand::Bytes(build_frame(
            &NinebotMessage {
                source: NINEBOT_ADDR_APP,
                destination: NINEBOT_ADDR_ESC,
                parameter: NINEBOT_CMD_READ,
                data: vec![register, length],
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

    /// Primary live-data register block.
    fn parse_live_data(
        &mut self,
        data: &[u8],
        state: &mut WheelState,
        config: &DecoderConfig,
    ) -> bool {
        if data.len() < 30 {
            return false;
        }
        state.battery_level = le_u16(data, 2) as i32;
        state.speed = match config.ninebot_variant {
            // S2 boards widened the speed word: unsigned, its own offset.
            NinebotVariant::S2 => be_u16(data, 28) as i32,
            _ => be_i16(data, 10) as i32 * 10,
        };
        state.total_distance = le_u32(data, 14) as u64;
        state.temperature = le_i16(data, 22) as i32 * 10;
        state.voltage = le_u16(data, 24) as u32;
        state.current = le_i16(data, 26) as i32;
        state.update_power();
        true
    }

    /// Secondary live block. `temperature2` multiplies by 100 where the
    /// primary block multiplies by 10; the discrepancy ships in firmware
    /// and is kept bit-exact.
    fn parse_live_data4(&mut self, data: &[u8], state: &mut WheelState) -> bool {
        if data.len() < 2 {
            return false;
        }
        state.temperature2 = le_i16(data, 0) as i32 * 100;
        true
    }

    fn dispatch(
        &mut self,
        message: &NinebotMessage,
        state: &mut WheelState,
        config: &DecoderConfig,
        has_new_data: &mut bool,
    ) -> bool {
        match message.parameter {
            p if p == NINEBOT_REG_SERIAL || p == NINEBOT_REG_SERIAL_2 || p == NINEBOT_REG_SERIAL_3 => {
                let slot = match p {
                    p if p == NINEBOT_REG_SERIAL => 0,
                    p if p == NINEBOT_REG_SERIAL_2 => 1,
                    _ => 2,
                };
                self.serial_parts[slot] = Some(Self::ascii(&message.data));
                if self.serial_parts.iter().all(Option::is_some) {
                    state.serial_number = self
                        .serial_parts
                        .iter()
                        .flatten()
                        .cloned()
                        .collect::<String>();
                    if self.phase == Phase::WaitSerial {
                        self.phase = Phase::WaitVersion;
                    }
                }
                true
            }
            p if p == NINEBOT_REG_VERSION => {
                if message.data.len() < 2 {
                    return false;
                }
                let raw = le_u16(&message.data, 0);
                state.version =
                    format!("{}.{}.{}", (raw >> 8) & 0x0F, (raw >> 4) & 0x0F, raw & 0x0F);
                if self.phase == Phase::WaitVersion {
                    self.phase = Phase::Ready;
                }
                true
            }
            p if p == NINEBOT_REG_LIVE => {
                let parsed = self.parse_live_data(&message.data, state, config);
                *has_new_data |= parsed;
                parsed
            }
            p if p == NINEBOT_REG_LIVE_EXTRA => self.parse_live_data4(&message.data, state),
            other => {
                log::debug!("ninebot: ignoring register {other:#04x}");
                false
            }
        }
    }
}

impl Default for NinebotDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for NinebotDecoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::Ninebot
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
                    log_frame_hex("ninebot: discarding corrupt frame", &frame);
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
        self.phase = Phase::WaitSerial;
        self.serial_parts = [None, None, None];
    }

    fn keep_alive_command(&self, config: &DecoderConfig) -> Option<WheelCommand> {
        let _ = config;
        Some(match self.phase {
            Phase::WaitSerial => self.read_request(NINEBOT_REG_SERIAL, 14),
            Phase::WaitVersion => self.read_request(NINEBOT_REG_VERSION, 2),
            Phase::Ready => self.read_request(NINEBOT_REG_LIVE, 32),
        })
    }

    fn keep_alive_interval_ms(&self) -> u64 {
        NINEBOT_KEEP_ALIVE_MS
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        match action {
            WheelAction::RequestSerial => vec![self.read_request(NINEBOT_REG_SERIAL, 14)],
            _ => Vec::new(),
        }
    }
}
