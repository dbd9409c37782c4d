//! # InMotion V1 Decoder (CAN-over-air)
//!
//! First-generation InMotion wheels tunnel 16-byte CAN bus records through
//! the wireless link. A record whose `len` field is `0xFE` announces an
//! appended extended-data blob (its length rides in the first four data
//! bytes); the blob carries the real telemetry. Everything interesting is
//! keyed off the little-endian CAN id.
//!
//! The connection has two phases: until a slow-info record reveals the
//! model (and with it the speed divisor and battery curve), the keep-alive
//! requests slow info; afterwards it requests fast info every 250 ms.

use nom::bytes::complete::take;
use nom::number::complete::{le_u32 as nom_le_u32, u8 as nom_u8};
use nom::IResult;

use crate::constants::{
    INMOTION_CAN_RECORD_LEN, INMOTION_EXTENDED_LEN_MARKER, INMOTION_MSG_ALERT,
    INMOTION_MSG_CALIBRATION, INMOTION_MSG_FAST_INFO, INMOTION_MSG_LIGHT, INMOTION_MSG_PIN_CODE,
    INMOTION_MSG_PLAY_SOUND, INMOTION_MSG_RIDE_MODE, INMOTION_MSG_SLOW_INFO,
    INMOTION_MSG_SPEAKER_VOLUME, INMOTION_V1_KEEP_ALIVE_MS,
};
use crate::decoder::{DecodedData, DecoderConfig, WheelAction, WheelCommand, WheelDecoder, WheelType};
use crate::telemetry::WheelState;
use crate::unpack::inmotion::frame_payload;
use crate::unpack::{InmotionV1Unpacker, Unpacker};
use crate::util::codec::{le_i32, round_half_away};
use crate::util::hex::encode_hex_upper;

/// InMotion V1 model families, detected from slow-info identity bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    R1N,
    R1S,
    R1Cf,
    R1Ap,
    R1Ex,
    R1Sample,
    R1T,
    R10,
    V3,
    V3C,
    V3Pro,
    V3S,
    R2,
    V5,
    V5Plus,
    V5F,
    V5FPlus,
    L6,
    V8,
    V8F,
    V8S,
    V10,
    V10F,
    Unknown,
}

impl Model {
    /// Identity is a 1- or 2-character id assembled from slow-info bytes
    /// 104 (primary) and 107 (secondary, when non-zero).
    fn from_id(id: &str) -> Model {
        match id {
            "0" => Model::R1N,
            "1" => Model::R1S,
            "2" => Model::R1Cf,
            "3" => Model::R1Ap,
            "4" => Model::R1Ex,
            "5" => Model::R1Sample,
            "6" => Model::R1T,
            "7" => Model::R10,
            "10" => Model::V3,
            "11" => Model::V3C,
            "12" => Model::V3Pro,
            "13" => Model::V3S,
            "21" => Model::R2,
            "50" => Model::V5,
            "51" => Model::V5Plus,
            "52" => Model::V5F,
            "53" => Model::V5FPlus,
            "60" => Model::L6,
            "80" => Model::V8,
            "86" => Model::V8F,
            "87" => Model::V8S,
            "A0" => Model::V10,
            "A1" => Model::V10F,
            _ => Model::Unknown,
        }
    }

    /// Raw-speed divisor for the averaged motor speed words.
    fn speed_divisor(self) -> f64 {
        match self {
            Model::R1S | Model::R1Sample => 1000.0,
            Model::R1T => 3810.0,
            _ => 3812.0,
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Model::R1N => "InMotion R1N",
            Model::R1S => "InMotion R1S",
            Model::R1Cf => "InMotion R1CF",
            Model::R1Ap => "InMotion R1AP",
            Model::R1Ex => "InMotion R1EX",
            Model::R1Sample => "InMotion R1 Sample",
            Model::R1T => "InMotion R1T",
            Model::R10 => "InMotion R10",
            Model::V3 => "InMotion V3",
            Model::V3C => "InMotion V3C",
            Model::V3Pro => "InMotion V3PRO",
            Model::V3S => "InMotion V3S",
            Model::R2 => "InMotion R2",
            Model::V5 => "InMotion V5",
            Model::V5Plus => "InMotion V5+",
            Model::V5F => "InMotion V5F",
            Model::V5FPlus => "InMotion V5F+",
            Model::L6 => "InMotion L6",
            Model::V8 => "InMotion V8",
            Model::V8F => "InMotion V8F",
            Model::V8S => "InMotion V8S",
            Model::V10 => "InMotion V10",
            Model::V10F => "InMotion V10F",
            Model::Unknown => "InMotion",
        }
    }

    /// V10-generation boards (and the V8F/V8S refresh) renumbered the work
    /// modes into the low nibble.
    fn uses_new_work_mode(self) -> bool {
        matches!(self, Model::V10 | Model::V10F | Model::V8F | Model::V8S)
    }

    /// Odometer word position moved in the V5-and-later layout.
    fn distance_offset(self) -> usize {
        match self {
            Model::V5
            | Model::V5Plus
            | Model::V5F
            | Model::V5FPlus
            | Model::V8
            | Model::V8F
            | Model::V8S
            | Model::V10
            | Model::V10F
            | Model::L6 => 48,
            _ => 44,
        }
    }

    /// Battery curve on the V×100 reading, per model family.
    fn battery_level(self, voltage: i32) -> i32 {
        let v = voltage as f64;
        let level = match self {
            Model::V5 | Model::V5Plus | Model::V5F | Model::V5FPlus | Model::V8 | Model::V8F
            | Model::V8S => {
                if v > 8250.0 {
                    100.0
                } else if v < 6800.0 {
                    0.0
                } else {
                    (v - 6800.0) / 14.5
                }
            }
            Model::V10 | Model::V10F => {
                if v > 8350.0 {
                    100.0
                } else if v < 6800.0 {
                    0.0
                } else {
                    (v - 6800.0) / 15.5
                }
            }
            Model::L6 => {
                if v > 6700.0 {
                    100.0
                } else if v < 5400.0 {
                    0.0
                } else {
                    (v - 5400.0) / 13.0
                }
            }
            // R-series and V3 share the 82 V pack.
            _ => {
                if v > 8200.0 {
                    100.0
                } else if v < 7100.0 {
                    0.0
                } else {
                    (v - 7100.0) / 11.0
                }
            }
        };
        round_half_away(level) as i32
    }
}

/// A decoded 16-byte CAN record plus its optional extended blob.
#[derive(Debug, Clone, PartialEq)]
struct CanRecord {
    id: u32,
    data: [u8; 8],
    len: u8,
    channel: u8,
    format: u8,
    kind: u8,
    extended: Vec<u8>,
}

fn parse_can_record(input: &[u8]) -> IResult<&[u8], CanRecord> {
    let (input, id) = nom_le_u32(input)?;
    let (input, data) = take(8usize)(input)?;
    let (input, len) = nom_u8(input)?;
    let (input, channel) = nom_u8(input)?;
    let (input, format) = nom_u8(input)?;
    let (input, kind) = nom_u8(input)?;

    let mut record = CanRecord {
        id,
        data: data.try_into().expect("take(8) yields 8 bytes"),
        len,
        channel,
        format,
        kind,
        extended: Vec::new(),
    };

    if len == INMOTION_EXTENDED_LEN_MARKER {
        let ex_len = crate::util::codec::le_u32(&record.data, 0) as usize;
        let (input, extended) = take(ex_len)(input)?;
        record.extended = extended.to_vec();
        return Ok((input, record));
    }
    Ok((input, record))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionPhase {
    NeedSlowData,
    Streaming,
}

/// Stateful InMotion V1 protocol decoder.
pub struct InmotionV1Decoder {
    unpacker: InmotionV1Unpacker,
    phase: ConnectionPhase,
    model: Model,
}

impl InmotionV1Decoder {
    pub fn new() -> Self {
        Self {
            unpacker: InmotionV1Unpacker::new(),
            phase: ConnectionPhase::NeedSlowData,
            model: Model::Unknown,
        }
    }

    /// Standard outbound CAN message: 8 data bytes on channel 5.
    fn can_message(id: u32, data: [u8; 8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(INMOTION_CAN_RECORD_LEN);
        payload.extend_from_slice(&id.to_le_bytes());
        payload.extend_from_slice(&data);
        payload.push(8); // len
        payload.push(5); // channel
        payload.push(0); // standard format
        payload.push(0); // data type
        frame_payload(&payload)
    }

    fn fast_info_request() -> WheelCommand {
        WheelCommand::Bytes(Self::can_message(INMOTION_MSG_FAST_INFO, [0xFF; 8]))
    }

    fn slow_info_request() -> WheelCommand {
        WheelCommand::Bytes(Self::can_message(INMOTION_MSG_SLOW_INFO, [0xFF; 8]))
    }

    fn work_mode_str(&self, value: i32) -> String {
        let key = if self.model.uses_new_work_mode() {
            value & 0x0F
        } else {
            value
        };
        let name = match key {
            0 => "Idle",
            1 => "Drive",
            2 => "Zero",
            3 => "LargeAngle",
            4 => "Checkc",
            5 => "Lock",
            6 => "Error",
            7 => "Carry",
            8 => "RemoteControl",
            9 => "Shutdown",
            16 => "PomStop",
            18 => "Unlock",
            _ => "Unknown",
        };
        name.to_string()
    }

    fn parse_slow_info(&mut self, record: &CanRecord, state: &mut WheelState) -> bool {
        let ex = &record.extended;
        if ex.len() < 108 {
            log::debug!("inmotion: slow info blob too short ({} bytes)", ex.len());
            return false;
        }

        state.serial_number = encode_hex_upper(&ex[0..8]);
        state.version = format!("{}.{}.{}", ex[26], ex[25], ex[24]);

        let primary = ex[104] as char;
        let secondary = ex[107] as char;
        let id = if ex[107] == 0 {
            primary.to_string()
        } else {
            format!("{primary}{secondary}")
        };
        self.model = Model::from_id(&id);
        state.model = self.model.display_name().to_string();
        self.phase = ConnectionPhase::Streaming;
        log::info!("inmotion: model id \"{id}\" -> {}", state.model);
        true
    }

    fn parse_fast_info(&mut self, record: &CanRecord, state: &mut WheelState) -> bool {
        let ex = &record.extended;
        if ex.len() < 76 {
            log::debug!("inmotion: fast info blob too short ({} bytes)", ex.len());
            return false;
        }

        let angle = le_i32(ex, 0) as f64 / 65536.0;
        state.angle = round_half_away(angle * 100.0) as i32;
        let roll = le_i32(ex, 72) as f64 / 90.0;
        state.roll = round_half_away(roll * 100.0) as i32;

        let motor_sum = (le_i32(ex, 12) as f64 + le_i32(ex, 16) as f64).abs();
        let speed_kmh = motor_sum / (self.model.speed_divisor() * 2.0) * 3.6;
        state.speed = round_half_away(speed_kmh * 100.0) as i32;

        state.current = le_i32(ex, 20);
        state.voltage = le_i32(ex, 24).max(0) as u32;
        state.temperature = (ex[32] as i32 + 80 - 256) * 100;
        state.total_distance = le_i32(ex, self.model.distance_offset()).max(0) as u64;
        state.battery_level = self.model.battery_level(state.voltage as i32);
        state.mode_str = self.work_mode_str(le_i32(ex, 60));
        state.update_power();
        true
    }

    fn alert_text(id: u8) -> String {
        match id {
            0x05 => "Fall protection".to_string(),
            0x06 => "Speed cut-off".to_string(),
            0x19 => "Low battery".to_string(),
            other => format!("Alert {other:#04x}"),
        }
    }

    fn dispatch(
        &mut self,
        record: &CanRecord,
        state: &mut WheelState,
        has_new_data: &mut bool,
        news: &mut Option<String>,
    ) -> bool {
        match record.id {
            id if id == INMOTION_MSG_FAST_INFO => {
                let parsed = self.parse_fast_info(record, state);
                *has_new_data |= parsed;
                parsed
            }
            id if id == INMOTION_MSG_SLOW_INFO => self.parse_slow_info(record, state),
            id if id == INMOTION_MSG_RIDE_MODE => {
                state.ride_mode = record.data[0] != 0;
                true
            }
            id if id == INMOTION_MSG_LIGHT => {
                state.light_mode = record.data[0] as i32;
                true
            }
            id if id == INMOTION_MSG_SPEAKER_VOLUME => {
                state.speaker_volume = record.data[0] as i32;
                true
            }
            id if id == INMOTION_MSG_ALERT => {
                let text = Self::alert_text(record.data[0]);
                state.alert = text.clone();
                *news = Some(text);
                true
            }
            other => {
                log::debug!(
                    "inmotion: ignoring CAN id {other:#010x} (len {}, ch {}, fmt {}, type {})",
                    record.len,
                    record.channel,
                    record.format,
                    record.kind
                );
                false
            }
        }
    }
}

impl Default for InmotionV1Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for InmotionV1Decoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::InmotionV1
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
        let mut news = None;
        let mut changed = false;

        for &byte in data {
            if self.unpacker.add_byte(byte) {
                let payload = self.unpacker.frame().to_vec();
                self.unpacker.reset();
                match parse_can_record(&payload) {
                    Ok((_, record)) => {
                        changed |= self.dispatch(&record, &mut state, &mut has_new_data, &mut news);
                    }
                    Err(_) => {
                        log::debug!("inmotion: undersized CAN payload ({} bytes)", payload.len());
                    }
                }
            }
        }

        if !changed {
            return None;
        }
        state.news = news.clone().unwrap_or_default();
        Some(DecodedData {
            state,
            commands: Vec::new(),
            has_new_data,
            news,
        })
    }

    fn is_ready(&self) -> bool {
        self.phase == ConnectionPhase::Streaming
    }

    fn reset(&mut self) {
        self.unpacker.reset();
        self.phase = ConnectionPhase::NeedSlowData;
        self.model = Model::Unknown;
    }

    fn init_commands(&self, config: &DecoderConfig) -> Vec<WheelCommand> {
        let mut commands = Vec::new();
        if !config.password.is_empty() {
            let mut data = [0u8; 8];
            for (slot, digit) in data.iter_mut().zip(config.password.bytes()).take(6) {
                *slot = digit;
            }
            commands.push(WheelCommand::Bytes(Self::can_message(
                INMOTION_MSG_PIN_CODE,
                data,
            )));
        }
        commands.push(WheelCommand::BytesWithDelay {
            bytes: Self::slow_info_request().bytes().to_vec(),
            delay_ms: 100,
        });
        commands
    }

    fn keep_alive_command(&self, _config: &DecoderConfig) -> Option<WheelCommand> {
        Some(match self.phase {
            ConnectionPhase::NeedSlowData => Self::slow_info_request(),
            ConnectionPhase::Streaming => Self::fast_info_request(),
        })
    }

    fn keep_alive_interval_ms(&self) -> u64 {
        INMOTION_V1_KEEP_ALIVE_MS
    }

    fn build_command(&self, action: &WheelAction, _config: &DecoderConfig) -> Vec<WheelCommand> {
        let message = match action {
            WheelAction::LightOn => Some(Self::can_message(INMOTION_MSG_LIGHT, {
                let mut d = [0u8; 8];
                d[0] = 1;
                d
            })),
            WheelAction::LightOff => Some(Self::can_message(INMOTION_MSG_LIGHT, [0u8; 8])),
            WheelAction::PlaySound(sound) => Some(Self::can_message(INMOTION_MSG_PLAY_SOUND, {
                let mut d = [0u8; 8];
                d[0] = *sound;
                d
            })),
            WheelAction::SetSpeakerVolume(volume) => {
                Some(Self::can_message(INMOTION_MSG_SPEAKER_VOLUME, {
                    let mut d = [0u8; 8];
                    d[0] = *volume;
                    d
                }))
            }
            WheelAction::PedalsMode(mode) => Some(Self::can_message(INMOTION_MSG_RIDE_MODE, {
                let mut d = [0u8; 8];
                d[0] = *mode;
                d
            })),
            WheelAction::Calibrate => Some(Self::can_message(INMOTION_MSG_CALIBRATION, {
                let mut d = [0u8; 8];
                d[0] = 1;
                d
            })),
            _ => None,
        };
        message.map(WheelCommand::Bytes).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Extended-data record as a wheel would send it.
    fn extended_record(id: u32, extended: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&id.to_le_bytes());
        let mut data = [0u8; 8];
        data[0..4].copy_from_slice(&(extended.len() as u32).to_le_bytes());
        payload.extend_from_slice(&data);
        payload.push(INMOTION_EXTENDED_LEN_MARKER);
        payload.push(5);
        payload.push(0);
        payload.push(0);
        payload.extend_from_slice(extended);
        frame_payload(&payload)
    }

    fn slow_info_blob(model_primary: u8, model_secondary: u8) -> Vec<u8> {
        let mut ex = vec![0u8; 108];
        ex[0..8].copy_from_slice(&[0x88, 0x02, 0xCA, 0x12, 0x22, 0x07, 0x00, 0x2B]);
        ex[24] = 8; // patch
        ex[25] = 4; // minor
        ex[26] = 1; // major
        ex[104] = model_primary;
        ex[107] = model_secondary;
        ex
    }

    fn fast_info_blob(speed_words: i32, voltage: i32) -> Vec<u8> {
        let mut ex = vec![0u8; 80];
        ex[0..4].copy_from_slice(&(655_360i32).to_le_bytes()); // 10 degrees
        ex[12..16].copy_from_slice(&speed_words.to_le_bytes());
        ex[16..20].copy_from_slice(&speed_words.to_le_bytes());
        ex[20..24].copy_from_slice(&350i32.to_le_bytes()); // 3.5 A
        ex[24..28].copy_from_slice(&voltage.to_le_bytes());
        ex[32] = 200; // 24 °C
        ex[48..52].copy_from_slice(&250_000i32.to_le_bytes());
        ex[60..64].copy_from_slice(&1i32.to_le_bytes()); // Drive
        ex[72..76].copy_from_slice(&900i32.to_le_bytes()); // 10 degrees roll
        ex
    }

    #[test]
    fn test_slow_info_detects_v8() {
        let mut decoder = InmotionV1Decoder::new();
        let wire = extended_record(INMOTION_MSG_SLOW_INFO, &slow_info_blob(b'8', b'0'));
        let result = decoder
            .decode(&wire, &WheelState::default(), &DecoderConfig::default())
            .unwrap();
        assert_eq!(result.state.model, "InMotion V8");
        assert_eq!(result.state.version, "1.4.8");
        assert_eq!(result.state.serial_number, "8802CA122207002B");
        assert!(decoder.is_ready());
    }

    #[test]
    fn test_single_char_model_id() {
        let mut decoder = InmotionV1Decoder::new();
        let wire = extended_record(INMOTION_MSG_SLOW_INFO, &slow_info_blob(b'6', 0));
        let result = decoder
            .decode(&wire, &WheelState::default(), &DecoderConfig::default())
            .unwrap();
        assert_eq!(result.state.model, "InMotion R1T");
    }

    #[test]
    fn test_fast_info_speed_uses_model_divisor() {
        let mut decoder = InmotionV1Decoder::new();
        let config = DecoderConfig::default();
        let state = WheelState::default();

        // V8 first (divisor 3812), then live data.
        let state = decoder
            .decode(
                &extended_record(INMOTION_MSG_SLOW_INFO, &slow_info_blob(b'8', b'0')),
                &state,
                &config,
            )
            .unwrap()
            .state;
        let result = decoder
            .decode(
                &extended_record(INMOTION_MSG_FAST_INFO, &fast_info_blob(21_178, 8000)),
                &state,
                &config,
            )
            .unwrap();

        // (21178 + 21178) / (3812 * 2) * 3.6 = 20.0 km/h
        assert_eq!(result.state.speed, 2000);
        assert_eq!(result.state.voltage, 8000);
        assert_eq!(result.state.current, 350);
        assert_eq!(result.state.temperature, 2400);
        assert_eq!(result.state.total_distance, 250_000);
        assert_eq!(result.state.angle, 1000);
        assert_eq!(result.state.roll, 1000);
        assert_eq!(result.state.mode_str, "Drive");
        // V8 curve: (8000 - 6800) / 14.5 = 82.8 -> 83
        assert_eq!(result.state.battery_level, 83);
        assert!(result.has_new_data);
    }

    #[test]
    fn test_alert_message_becomes_news() {
        let mut decoder = InmotionV1Decoder::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(&INMOTION_MSG_ALERT.to_le_bytes());
        payload.extend_from_slice(&[0x06, 0, 0, 0, 0, 0, 0, 0]);
        payload.extend_from_slice(&[8, 5, 0, 0]);
        let wire = frame_payload(&payload);

        let result = decoder
            .decode(&wire, &WheelState::default(), &DecoderConfig::default())
            .unwrap();
        assert_eq!(result.news.as_deref(), Some("Speed cut-off"));
        assert_eq!(result.state.alert, "Speed cut-off");
    }

    #[test]
    fn test_keep_alive_phases() {
        let mut decoder = InmotionV1Decoder::new();
        let config = DecoderConfig::default();
        assert_eq!(decoder.keep_alive_interval_ms(), 250);

        let before = decoder.keep_alive_command(&config).unwrap();
        decoder
            .decode(
                &extended_record(INMOTION_MSG_SLOW_INFO, &slow_info_blob(b'8', b'0')),
                &WheelState::default(),
                &config,
            )
            .unwrap();
        let after = decoder.keep_alive_command(&config).unwrap();
        assert_ne!(before, after);

        // Steady state requests fast info: id FAST_INFO, len 8, ch 5, FF data.
        let mut unpacker = InmotionV1Unpacker::new();
        let mut payload = None;
        for &b in after.bytes() {
            if unpacker.add_byte(b) {
                payload = Some(unpacker.frame().to_vec());
            }
        }
        let payload = payload.expect("keep-alive is a framed message");
        let (_, record) = parse_can_record(&payload).unwrap();
        assert_eq!(record.id, INMOTION_MSG_FAST_INFO);
        assert_eq!(record.len, 8);
        assert_eq!(record.channel, 5);
        assert_eq!(record.format, 0);
        assert_eq!(record.kind, 0);
        assert_eq!(record.data, [0xFF; 8]);
    }

    #[test]
    fn test_undersized_payload_ignored() {
        let mut decoder = InmotionV1Decoder::new();
        let wire = frame_payload(&[0x01, 0x02, 0x03]);
        assert!(decoder
            .decode(&wire, &WheelState::default(), &DecoderConfig::default())
            .is_none());
    }
}
