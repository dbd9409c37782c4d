//! EUC Protocol Constants
//!
//! This module defines the frame headers, sizes, command bytes and timing
//! constants used by the wheel protocol decoders. Wire-compatibility values
//! are bit-exact; anything here that a wheel checks on receive must not change.

// ----------------------------------------------------------------------------
// Gotway / Begode
// ----------------------------------------------------------------------------

/// Gotway frame header, first byte
pub const GOTWAY_HEADER_0: u8 = 0x55;

/// Gotway frame header, second byte
pub const GOTWAY_HEADER_1: u8 = 0xAA;

/// Full Gotway frame length including header and footer
pub const GOTWAY_FRAME_LEN: usize = 24;

/// Gotway footer filler byte (last four bytes of every frame)
pub const GOTWAY_FOOTER: u8 = 0x5A;

/// Offset of the frame-type byte inside a Gotway frame
pub const GOTWAY_FRAME_TYPE_OFFSET: usize = 18;

/// Maximum identity-probe attempts before falling back to defaults
pub const GOTWAY_IDENTITY_RETRY_CAP: u32 = 50;

/// Firmware version request (single ASCII byte)
pub const GOTWAY_CMD_FIRMWARE: u8 = b'V';

/// Model name request (single ASCII byte)
pub const GOTWAY_CMD_NAME: u8 = b'N';

/// Miles-to-kilometers conversion factor used by Gotway firmware
pub const MILES_PER_KM: f64 = 0.621_371_192_237_33;

/// Gear-ratio multiplier applied when `use_ratio` is set
pub const GOTWAY_RATIO: f64 = 0.875;

// ----------------------------------------------------------------------------
// Veteran / Leaperkim
// ----------------------------------------------------------------------------

/// Veteran frame header
pub const VETERAN_HEADER: [u8; 3] = [0xDC, 0x5A, 0x5C];

/// Payload length above which a trailing CRC-32 is mandatory
pub const VETERAN_CRC_LEN_THRESHOLD: usize = 38;

/// Stale-frame guard: reset the assembler after this much silence
pub const VETERAN_STALE_MS: u64 = 100;

/// Largest payload any Veteran board emits (BMS frames included)
pub const VETERAN_MAX_PAYLOAD: usize = 255;

// ----------------------------------------------------------------------------
// Kingsong
// ----------------------------------------------------------------------------

/// Kingsong frame header, first byte
pub const KINGSONG_HEADER_0: u8 = 0xAA;

/// Kingsong frame header, second byte
pub const KINGSONG_HEADER_1: u8 = 0x55;

/// Full Kingsong frame length
pub const KINGSONG_FRAME_LEN: usize = 20;

/// Offset of the frame-type byte inside a Kingsong frame
pub const KINGSONG_FRAME_TYPE_OFFSET: usize = 16;

/// Fixed tail byte at offset 17 of outbound Kingsong frames
pub const KINGSONG_TAIL: u8 = 0x14;

/// Kingsong frame types
pub const KINGSONG_FRAME_LIVE: u8 = 0xA9;
pub const KINGSONG_FRAME_DISTANCE_TIME_FAN: u8 = 0xB9;
pub const KINGSONG_FRAME_NAME: u8 = 0xBB;
pub const KINGSONG_FRAME_SERIAL: u8 = 0xB3;
pub const KINGSONG_FRAME_MAX_SPEED_ALERTS: u8 = 0xB5;
pub const KINGSONG_FRAME_ALARM_PUSH: u8 = 0xA4;
pub const KINGSONG_FRAME_CPU: u8 = 0xF5;
pub const KINGSONG_FRAME_SPEED_LIMIT: u8 = 0xF6;
pub const KINGSONG_FRAME_BMS1: u8 = 0xF1;
pub const KINGSONG_FRAME_BMS2: u8 = 0xF2;

/// Request frame types (outbound)
pub const KINGSONG_REQ_NAME: u8 = 0x9B;
pub const KINGSONG_REQ_SERIAL: u8 = 0x63;
pub const KINGSONG_REQ_ALARMS: u8 = 0x98;

// ----------------------------------------------------------------------------
// InMotion V1 (CAN-over-air)
// ----------------------------------------------------------------------------

/// InMotion frame start byte (doubled)
pub const INMOTION_SYNC: u8 = 0xAA;

/// InMotion V1 frame end byte (doubled)
pub const INMOTION_V1_TAIL: u8 = 0x55;

/// Escape indicator inside the payload region
pub const INMOTION_ESCAPE: u8 = 0xA5;

/// Bare CAN record length (id + data + len/channel/format/type)
pub const INMOTION_CAN_RECORD_LEN: usize = 16;

/// `len` value announcing an appended extended-data blob
pub const INMOTION_EXTENDED_LEN_MARKER: u8 = 0xFE;

/// CAN message ids, little-endian decoded
pub const INMOTION_MSG_FAST_INFO: u32 = 0x0F55_0113;
pub const INMOTION_MSG_SLOW_INFO: u32 = 0x0F55_0114;
pub const INMOTION_MSG_RIDE_MODE: u32 = 0x0F55_0115;
pub const INMOTION_MSG_REMOTE_CONTROL: u32 = 0x0F55_0116;
pub const INMOTION_MSG_CALIBRATION: u32 = 0x0F55_0119;
pub const INMOTION_MSG_PIN_CODE: u32 = 0x0F55_0307;
pub const INMOTION_MSG_LIGHT: u32 = 0x0F55_010D;
pub const INMOTION_MSG_HANDLE_BUTTON: u32 = 0x0F55_012E;
pub const INMOTION_MSG_PLAY_SOUND: u32 = 0x0F55_0609;
pub const INMOTION_MSG_SPEAKER_VOLUME: u32 = 0x0F55_060A;
pub const INMOTION_MSG_ALERT: u32 = 0x0F78_0101;

/// Keep-alive cadence for the fast-info request
pub const INMOTION_V1_KEEP_ALIVE_MS: u64 = 250;

// ----------------------------------------------------------------------------
// InMotion V2
// ----------------------------------------------------------------------------

/// Flags byte for handshake-phase requests
pub const INMOTION_V2_FLAG_INITIAL: u8 = 0x11;

/// Flags byte for steady-state requests
pub const INMOTION_V2_FLAG_DEFAULT: u8 = 0x14;

/// InMotion V2 command bytes
pub const INMOTION_V2_CMD_MAIN_VERSION: u8 = 0x01;
pub const INMOTION_V2_CMD_MAIN_INFO: u8 = 0x02;
pub const INMOTION_V2_CMD_REAL_TIME: u8 = 0x04;
pub const INMOTION_V2_CMD_BATTERY_REAL_TIME: u8 = 0x05;
pub const INMOTION_V2_CMD_TOTAL_STATS: u8 = 0x11;
pub const INMOTION_V2_CMD_SETTINGS: u8 = 0x20;
pub const INMOTION_V2_CMD_CONTROL: u8 = 0x60;
pub const INMOTION_V2_CMD_SETTINGS_RESPONSE: u8 = 0xA0;

/// Sub-keys of the main-info command
pub const INMOTION_V2_INFO_CAR_TYPE: u8 = 0x01;
pub const INMOTION_V2_INFO_SERIAL: u8 = 0x02;
pub const INMOTION_V2_INFO_VERSIONS: u8 = 0x06;

/// Keep-alive cadence
pub const INMOTION_V2_KEEP_ALIVE_MS: u64 = 25;

// ----------------------------------------------------------------------------
// Ninebot / Ninebot-Z
// ----------------------------------------------------------------------------

/// Ninebot frame header
pub const NINEBOT_HEADER: [u8; 2] = [0x55, 0xAA];

/// Ninebot-Z frame header
pub const NINEBOT_Z_HEADER: [u8; 2] = [0x5A, 0xA5];

/// Total frame length minus the data length: header + len + src + dst +
/// param + crc16
pub const NINEBOT_FRAME_OVERHEAD: usize = 8;

/// Total frame length minus the data length: header + len + src + dst +
/// cmd + param + crc16
pub const NINEBOT_Z_FRAME_OVERHEAD: usize = 9;

/// Bus addresses
pub const NINEBOT_ADDR_APP: u8 = 0x3D;
pub const NINEBOT_ADDR_ESC: u8 = 0x20;
pub const NINEBOT_Z_ADDR_APP: u8 = 0x3E;
pub const NINEBOT_Z_ADDR_BLE: u8 = 0x14;
pub const NINEBOT_Z_ADDR_CONTROLLER: u8 = 0x15;
pub const NINEBOT_Z_ADDR_KEY_GENERATOR: u8 = 0x16;
pub const NINEBOT_Z_ADDR_BMS1: u8 = 0x11;
pub const NINEBOT_Z_ADDR_BMS2: u8 = 0x12;

/// Command bytes (Ninebot-Z cmd field)
pub const NINEBOT_CMD_READ: u8 = 0x01;
pub const NINEBOT_CMD_READ_REPLY: u8 = 0x04;
pub const NINEBOT_CMD_KEY_REPLY: u8 = 0x5B;

/// Register addresses shared by both generations
pub const NINEBOT_REG_SERIAL: u8 = 0x10;
pub const NINEBOT_REG_SERIAL_2: u8 = 0x13;
pub const NINEBOT_REG_SERIAL_3: u8 = 0x16;
pub const NINEBOT_REG_VERSION: u8 = 0x1A;
pub const NINEBOT_REG_LIVE: u8 = 0xB0;
pub const NINEBOT_REG_LIVE_EXTRA: u8 = 0xB4;

/// Ninebot-Z specific registers
pub const NINEBOT_Z_REG_BLE_VERSION: u8 = 0x68;
pub const NINEBOT_Z_REG_KEY: u8 = 0x5B;
pub const NINEBOT_Z_REG_PARAMS1: u8 = 0xB3;
pub const NINEBOT_Z_REG_PARAMS2: u8 = 0xB5;
pub const NINEBOT_Z_REG_PARAMS3: u8 = 0xB9;
pub const NINEBOT_Z_REG_BMS_SERIAL: u8 = 0x10;
pub const NINEBOT_Z_REG_BMS_LIFE: u8 = 0x30;
pub const NINEBOT_Z_REG_BMS_CELLS: u8 = 0x40;

/// Gamma key width
pub const NINEBOT_GAMMA_LEN: usize = 16;

/// Keep-alive cadences
pub const NINEBOT_KEEP_ALIVE_MS: u64 = 125;
pub const NINEBOT_Z_KEEP_ALIVE_MS: u64 = 25;

// ----------------------------------------------------------------------------
// Shared telemetry limits
// ----------------------------------------------------------------------------

/// Hard cap on cells a single BMS pack can report
pub const BMS_MAX_CELLS: usize = 48;

/// Number of temperature probes a BMS pack reports
pub const BMS_TEMP_SENSORS: usize = 6;
