//! # Gotway-vs-Veteran Auto-Detection
//!
//! Both brands ship under assorted labels over the same wireless service,
//! so a connection sometimes starts before the host knows which decoder to
//! build. The discrimination is trivial at the header level: Veteran frames
//! open with `DC 5A 5C`, Gotway with `55 AA`. This decoder watches the raw
//! runs for the first header, latches the matching inner decoder and
//! delegates everything to it from then on.

use crate::constants::{GOTWAY_HEADER_0, GOTWAY_HEADER_1, VETERAN_HEADER};
use crate::decoder::{DecodedData, DecoderConfig, WheelAction, WheelCommand, WheelDecoder, WheelType};
use crate::protocol::gotway::GotwayDecoder;
use crate::protocol::veteran::VeteranDecoder;
use crate::telemetry::WheelState;
use crate::util::hex::encode_hex;

/// Latching Gotway/Veteran discriminator.
pub struct AutoDetectDecoder {
    latched: Option<WheelType>,
    gotway: GotwayDecoder,
    veteran: VeteranDecoder,
}

impl AutoDetectDecoder {
    pub fn new() -> Self {
        Self {
            latched: None,
            gotway: GotwayDecoder::new(),
            veteran: VeteranDecoder::new(),
        }
    }

    /// The detected concrete protocol, if any.
    pub fn detected(&self) -> Option<WheelType> {
        self.latched
    }

    fn probe(data: &[u8]) -> Option<WheelType> {
        if data
            .windows(VETERAN_HEADER.len())
            .any(|window| window == VETERAN_HEADER)
        {
            return Some(WheelType::Veteran);
        }
        if data
            .windows(2)
            .any(|window| window == [GOTWAY_HEADER_0, GOTWAY_HEADER_1])
        {
            return Some(WheelType::Gotway);
        }
        None
    }

    fn inner(&mut self) -> Option<&mut dyn WheelDecoder> {
        match self.latched? {
            WheelType::Veteran => Some(&mut self.veteran),
            _ => Some(&mut self.gotway),
        }
    }
}

impl Default for AutoDetectDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelDecoder for AutoDetectDecoder {
    fn wheel_type(&self) -> WheelType {
        WheelType::GotwayVirtual
    }

    fn decode(
        &mut self,
        data: &[u8],
        previous: &WheelState,
        config: &DecoderConfig,
    ) -> Option<DecodedData> {
        if self.latched.is_none() {
            self.latched = Self::probe(data);
            match self.latched {
                Some(detected) => log::info!("autodetect: latched {detected}"),
                None => log::debug!(
                    "autodetect: no header in run prefix {}",
                    encode_hex(&data[..data.len().min(8)])
                ),
            }
        }
        self.inner()?.decode(data, previous, config)
    }

    fn is_ready(&self) -> bool {
        match self.latched {
            Some(WheelType::Veteran) => self.veteran.is_ready(),
            Some(_) => self.gotway.is_ready(),
            None => false,
        }
    }

    fn reset(&mut self) {
        self.latched = None;
        self.gotway.reset();
        self.veteran.reset();
    }

    fn keep_alive_command(&self, config: &DecoderConfig) -> Option<WheelCommand> {
        match self.latched {
            Some(WheelType::Veteran) => self.veteran.keep_alive_command(config),
            Some(_) => self.gotway.keep_alive_command(config),
            None => None,
        }
    }

    fn keep_alive_interval_ms(&self) -> u64 {
        match self.latched {
            Some(WheelType::Veteran) => self.veteran.keep_alive_interval_ms(),
            Some(_) => self.gotway.keep_alive_interval_ms(),
            None => 0,
        }
    }

    fn build_command(&self, action: &WheelAction, config: &DecoderConfig) -> Vec<WheelCommand> {
        match self.latched {
            Some(WheelType::Veteran) => self.veteran.build_command(action, config),
            Some(_) => self.gotway.build_command(action, config),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::hex_to_bytes;

    const VETERAN_FRAME: &str =
        "DC5A5C2025D600003BF500003BF50000FFDE13990DEF0000024602460000000000000000";

    fn gotway_live_frame() -> Vec<u8> {
        let mut frame = vec![0x55, 0xAA];
        frame.extend_from_slice(&6000u16.to_be_bytes());
        frame.extend_from_slice(&[0u8; 14]);
        frame.push(0x00);
        frame.push(0x18);
        frame.extend_from_slice(&[0x5A; 4]);
        frame
    }

    #[test]
    fn test_latches_veteran_on_header() {
        let mut decoder = AutoDetectDecoder::new();
        let result = decoder.decode(
            &hex_to_bytes(VETERAN_FRAME),
            &WheelState::default(),
            &DecoderConfig::default(),
        );
        assert_eq!(decoder.detected(), Some(WheelType::Veteran));
        assert_eq!(result.unwrap().state.model, "Sherman");
    }

    #[test]
    fn test_latches_gotway_on_header() {
        let mut decoder = AutoDetectDecoder::new();
        let result = decoder.decode(
            &gotway_live_frame(),
            &WheelState::default(),
            &DecoderConfig::default(),
        );
        assert_eq!(decoder.detected(), Some(WheelType::Gotway));
        assert_eq!(result.unwrap().state.voltage, 6000);
    }

    #[test]
    fn test_noise_keeps_probing() {
        let mut decoder = AutoDetectDecoder::new();
        assert!(decoder
            .decode(&[0x01, 0x02, 0x03], &WheelState::default(), &DecoderConfig::default())
            .is_none());
        assert_eq!(decoder.detected(), None);

        decoder.decode(
            &hex_to_bytes(VETERAN_FRAME),
            &WheelState::default(),
            &DecoderConfig::default(),
        );
        assert_eq!(decoder.detected(), Some(WheelType::Veteran));
    }

    #[test]
    fn test_reset_clears_latch() {
        let mut decoder = AutoDetectDecoder::new();
        decoder.decode(
            &hex_to_bytes(VETERAN_FRAME),
            &WheelState::default(),
            &DecoderConfig::default(),
        );
        decoder.reset();
        assert_eq!(decoder.detected(), None);

        // Redetection can land on the other brand.
        decoder.decode(
            &gotway_live_frame(),
            &WheelState::default(),
            &DecoderConfig::default(),
        );
        assert_eq!(decoder.detected(), Some(WheelType::Gotway));
    }
}
