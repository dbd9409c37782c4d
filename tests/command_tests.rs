//! Outbound command construction across protocols: byte dialects, staging
//! delays, and the law that every framed request survives its own protocol's
//! reassembly and parse path.

use euc_rs::protocol::ninebot::{self, Gamma, NinebotMessage};
use euc_rs::protocol::ninebot_z;
use euc_rs::{
    create_decoder, DecoderConfig, InmotionV2Unpacker, KingsongUnpacker, NinebotUnpacker,
    Unpacker, WheelAction, WheelCommand, WheelDecoder, WheelType,
};

fn single_bytes(commands: &[WheelCommand]) -> Vec<u8> {
    assert_eq!(commands.len(), 1);
    commands[0].bytes().to_vec()
}

#[test]
fn test_gotway_ascii_dialect() {
    let decoder = create_decoder(WheelType::Gotway).unwrap();
    let config = DecoderConfig::default();

    let table: [(WheelAction, &[u8]); 8] = [
        (WheelAction::Beep, b"b"),
        (WheelAction::LightOn, b"Q"),
        (WheelAction::LightOff, b"E"),
        (WheelAction::LightStrobe, b"T"),
        (WheelAction::PedalsMode(0), b"h"),
        (WheelAction::Miles(true), b"m"),
        (WheelAction::Miles(false), b"g"),
        (WheelAction::RollAngleMode(1), b"="),
    ];
    for (action, expected) in table {
        assert_eq!(
            single_bytes(&decoder.build_command(&action, &config)),
            expected,
            "{action:?}"
        );
    }
}

#[test]
fn test_gotway_staged_max_speed_delays() {
    let decoder = create_decoder(WheelType::Gotway).unwrap();
    let commands = decoder.build_command(&WheelAction::SetMaxSpeed(30), &DecoderConfig::default());

    let delays: Vec<u64> = commands.iter().map(|c| c.delay_ms()).collect();
    assert_eq!(delays, vec![0, 100, 100, 100, 100, 100, 300]);
    let bytes: Vec<u8> = commands.iter().map(|c| c.bytes()[0]).collect();
    assert_eq!(bytes, vec![b'b', b'W', b'Y', b'3', b'0', b'b', b'b']);
}

#[test]
fn test_kingsong_requests_are_valid_frames() {
    let decoder = create_decoder(WheelType::Kingsong).unwrap();
    let config = DecoderConfig::default();

    for (action, expected_type) in [
        (WheelAction::RequestName, 0x9B),
        (WheelAction::RequestSerial, 0x63),
        (WheelAction::RequestSettings, 0x98),
    ] {
        let wire = single_bytes(&decoder.build_command(&action, &config));
        let mut unpacker = KingsongUnpacker::new();
        let mut complete = None;
        for &byte in &wire {
            if unpacker.add_byte(byte) {
                complete = Some(unpacker.frame().to_vec());
            }
        }
        let frame = complete.expect("request reassembles as a Kingsong frame");
        assert_eq!(frame[16], expected_type);
        assert_eq!(frame[17], 0x14);
    }
}

#[test]
fn test_inmotion_v2_requests_round_trip() {
    let decoder = create_decoder(WheelType::InmotionV2).unwrap();
    let config = DecoderConfig::default();

    let wire = single_bytes(&decoder.build_command(&WheelAction::SetSpeakerVolume(70), &config));
    let mut unpacker = InmotionV2Unpacker::new();
    let mut body = None;
    for &byte in &wire {
        if unpacker.add_byte(byte) {
            body = Some(unpacker.frame().to_vec());
        }
    }
    let body = body.expect("control write reassembles");
    // [flags, len, command, setting, value]
    assert_eq!(body[0], 0x14);
    assert_eq!(body[2], 0x60);
    assert_eq!(body[3], 0x05);
    assert_eq!(body[4], 70);
}

#[test]
fn test_ninebot_request_round_trip() {
    let decoder = create_decoder(WheelType::Ninebot).unwrap();
    let config = DecoderConfig::default();

    let wire = single_bytes(&decoder.build_command(&WheelAction::RequestSerial, &config));
    let mut unpacker = NinebotUnpacker::new();
    let mut frame = None;
    for &byte in &wire {
        if unpacker.add_byte(byte) {
            frame = Some(unpacker.frame().to_vec());
        }
    }
    let message = ninebot::open_frame(&frame.unwrap(), &Gamma::new()).unwrap();
    assert_eq!(
        message,
        NinebotMessage {
            source: 0x3D,
            destination: 0x20,
            parameter: 0x01,
            data: vec![0x10, 14],
        }
    );
}

#[test]
fn test_ninebot_z_round_trip_under_gamma() {
    // Command build -> unpacker -> parse recovers the message exactly when
    // both ends hold the same gamma.
    let mut gamma = Gamma::new();
    gamma.replace(&[9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0xA, 0xB, 0xC, 0xD, 0xE, 0xF]);

    let message = ninebot_z::NinebotZMessage {
        source: 0x3E,
        destination: 0x15,
        command: 0x01,
        parameter: 0xB0,
        data: vec![32],
    };
    let wire = ninebot_z::build_frame(&message, &gamma);

    let mut unpacker = NinebotUnpacker::ninebot_z();
    let mut frame = None;
    for &byte in &wire {
        if unpacker.add_byte(byte) {
            frame = Some(unpacker.frame().to_vec());
        }
    }
    let recovered = ninebot_z::open_frame(&frame.unwrap(), &gamma).unwrap();
    assert_eq!(recovered, message);
}

#[test]
fn test_unsupported_actions_lower_to_nothing() {
    let config = DecoderConfig::default();
    // Veteran has no cutout-angle dialect; Kingsong has no roll-angle mode.
    let veteran = create_decoder(WheelType::Veteran).unwrap();
    assert!(veteran
        .build_command(&WheelAction::SetCutoutAngle(300), &config)
        .is_empty());

    let kingsong = create_decoder(WheelType::Kingsong).unwrap();
    assert!(kingsong
        .build_command(&WheelAction::RollAngleMode(0), &config)
        .is_empty());
}

#[test]
fn test_init_command_order_and_delays_are_preserved() {
    let config = DecoderConfig::default();

    let kingsong = create_decoder(WheelType::Kingsong).unwrap();
    let delays: Vec<u64> = kingsong
        .init_commands(&config)
        .iter()
        .map(|c| c.delay_ms())
        .collect();
    assert_eq!(delays, vec![0, 100, 200]);

    let inmotion_v2 = create_decoder(WheelType::InmotionV2).unwrap();
    let delays: Vec<u64> = inmotion_v2
        .init_commands(&config)
        .iter()
        .map(|c| c.delay_ms())
        .collect();
    assert_eq!(delays, vec![0, 100, 200, 300, 400]);
}

#[test]
fn test_inmotion_v1_init_includes_pin_when_configured() {
    let decoder = create_decoder(WheelType::InmotionV1).unwrap();

    let without = decoder.init_commands(&DecoderConfig::default());
    assert_eq!(without.len(), 1);

    let config = DecoderConfig {
        password: "123456".to_string(),
        ..Default::default()
    };
    let with_pin = decoder.init_commands(&config);
    assert_eq!(with_pin.len(), 2);
    assert_eq!(with_pin[0].delay_ms(), 0);
    assert_eq!(with_pin[1].delay_ms(), 100);
}
