//! Unit tests for the packet codec.

use super::packet::{checksum, validate_trailer};
use super::*;

fn sample_status() -> DeviceStatus {
    DeviceStatus::new(ReturnCode::ReceivedFrame, 0, 2, 10)
}

fn all_command_payloads() -> Vec<CommandPayload> {
    vec![
        CommandPayload::Specifications,
        CommandPayload::Reset,
        CommandPayload::PrepImage {
            format: 16,
            options: 0,
            image_len: 1_440_000,
        },
        CommandPayload::SendImage {
            sequence: 23,
            data: vec![0xAB; 300],
        },
        CommandPayload::CommitImage,
        CommandPayload::LockState,
        CommandPayload::PrinterLock { lock_state: 1 },
        CommandPayload::ChangePassword,
        CommandPayload::Version,
        CommandPayload::PrintCount,
        CommandPayload::ModelName,
        CommandPayload::StatusPoll,
        CommandPayload::PrePrint { cmd_number: 8 },
    ]
}

fn all_response_payloads() -> Vec<ResponsePayload> {
    vec![
        ResponsePayload::Specifications {
            max_width: 600,
            max_height: 800,
            max_colours: 256,
            unknown1: 10,
            max_msg_size: 60_000,
            unknown2: 16,
            unknown3: 0,
        },
        ResponsePayload::Reset,
        ResponsePayload::PrepImage { max_segment_len: 60_000 },
        ResponsePayload::SendImage { sequence: 23 },
        ResponsePayload::CommitImage,
        ResponsePayload::LockState { lock_state: 100 },
        ResponsePayload::PrinterLock,
        ResponsePayload::ChangePassword,
        ResponsePayload::Version {
            unknown1: 254,
            firmware: 275,
            hardware: 0,
        },
        ResponsePayload::PrintCount { print_history: 20 },
        ResponsePayload::ModelName {
            model: "SP-2".to_string(),
        },
        ResponsePayload::StatusPoll,
        ResponsePayload::PrePrint {
            cmd_number: 3,
            resp_number: 2,
        },
    ]
}

#[test]
fn test_command_codes_roundtrip() {
    for command in CommandType::ALL {
        assert_eq!(CommandType::try_from(command.code()), Ok(command));
    }
    assert_eq!(CommandType::try_from(99), Err(99));
}

#[test]
fn test_checksum_empty() {
    assert_eq!(checksum(&[]), 0xFFFF);
}

#[test]
fn test_checksum_known_value() {
    // !(1 + 2 + 3) masked to 16 bits
    assert_eq!(checksum(&[1, 2, 3]), 0xFFF9);
}

#[test]
fn test_command_roundtrip_all_types() {
    for session in [0u32, 1_234_567_890, u32::MAX] {
        for payload in all_command_payloads() {
            let packet = CommandPacket::new(session, 1111, payload);
            let encoded = packet.encode();
            assert!(validate_trailer(&encoded));
            match Packet::decode(&encoded).unwrap() {
                Packet::Command(decoded) => assert_eq!(decoded, packet),
                Packet::Response(_) => panic!("decoded a response from a command buffer"),
            }
        }
    }
}

#[test]
fn test_response_roundtrip_all_types() {
    let max_status = DeviceStatus::new(ReturnCode::PiSensor, 7, 7, 15);
    for (session, status) in [(0u32, sample_status()), (u32::MAX, max_status)] {
        for payload in all_response_payloads() {
            let packet = ResponsePacket::new(session, status, payload);
            let encoded = packet.encode();
            assert!(validate_trailer(&encoded));
            match Packet::decode(&encoded).unwrap() {
                Packet::Response(decoded) => assert_eq!(decoded, packet),
                Packet::Command(_) => panic!("decoded a command from a response buffer"),
            }
        }
    }
}

#[test]
fn test_command_header_layout() {
    let packet = CommandPacket::new(0x0102_0304, 1111, CommandPayload::Reset);
    let encoded = packet.encode();

    assert_eq!(encoded.len(), 16);
    assert_eq!(encoded[0], COMMAND_TAG);
    assert_eq!(encoded[1], 80);
    assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 16);
    assert_eq!(&encoded[4..8], &[1, 2, 3, 4]);
    assert_eq!(u16::from_be_bytes([encoded[8], encoded[9]]), 1111);
    assert_eq!(&encoded[10..12], &[0, 0]);
    assert_eq!(&encoded[14..16], &[13, 10]);
}

#[test]
fn test_response_status_packing() {
    let status = DeviceStatus::new(ReturnCode::Printing, 2, 3, 9);
    let packet = ResponsePacket::new(7, status, ResponsePayload::StatusPoll);
    let encoded = packet.encode();

    assert_eq!(encoded.len(), 20);
    assert_eq!(encoded[0], RESPONSE_TAG);
    assert_eq!(encoded[12], 163);
    assert_eq!(encoded[14], 2 << 2);
    assert_eq!(encoded[15], 3 << 4 | 9);
}

#[test]
fn test_send_image_lengths() {
    let data = vec![7u8; 60_000];
    let packet = CommandPacket::new(1, 1111, CommandPayload::SendImage { sequence: 0, data });
    let encoded = packet.encode();

    // 12-byte header + 4-byte sequence + segment + trailer
    assert_eq!(encoded.len(), 12 + 4 + 60_000 + 4);
    let declared = usize::from(u16::from_be_bytes([encoded[2], encoded[3]]));
    assert_eq!(declared, encoded.len());
}

#[test]
fn test_pre_print_payload_offset() {
    let packet = CommandPacket::new(1, 1111, CommandPayload::PrePrint { cmd_number: 5 });
    let encoded = packet.encode();

    // cmdNumber sits two bytes into the payload
    assert_eq!(&encoded[12..14], &[0, 0]);
    assert_eq!(u16::from_be_bytes([encoded[14], encoded[15]]), 5);
}

#[test]
fn test_model_name_length_follows_payload() {
    for model in ["SP-2", "SP-3", "instax mini"] {
        let packet = ResponsePacket::new(
            9,
            sample_status(),
            ResponsePayload::ModelName {
                model: model.to_string(),
            },
        );
        let encoded = packet.encode();
        assert_eq!(encoded.len(), 20 + model.len());
        match Packet::decode(&encoded).unwrap() {
            Packet::Response(ResponsePacket {
                payload: ResponsePayload::ModelName { model: decoded },
                ..
            }) => assert_eq!(decoded, model),
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}

#[test]
fn test_flipping_any_byte_invalidates() {
    let packet = CommandPacket::new(
        0xDEAD_BEEF,
        1111,
        CommandPayload::PrepImage {
            format: 16,
            options: 0,
            image_len: 1_440_000,
        },
    );
    let encoded = packet.encode();
    assert!(validate_trailer(&encoded));

    for i in 0..encoded.len() {
        let mut corrupted = encoded.clone();
        corrupted[i] ^= 0xFF;
        assert!(!validate_trailer(&corrupted), "flip at byte {i} went undetected");
    }
}

#[test]
fn test_decode_truncated() {
    let encoded = CommandPacket::new(1, 1111, CommandPayload::Reset).encode();

    assert!(matches!(
        Packet::decode(&encoded[..3]),
        Err(DecodeError::TruncatedPacket { .. })
    ));
    // Declared length no longer matches the buffer
    assert!(matches!(
        Packet::decode(&encoded[..encoded.len() - 1]),
        Err(DecodeError::TruncatedPacket { .. })
    ));
}

#[test]
fn test_decode_unknown_command_type() {
    let mut encoded = CommandPacket::new(1, 1111, CommandPayload::Reset).encode();
    encoded[1] = 99;
    assert_eq!(Packet::decode(&encoded), Err(DecodeError::UnknownCommandType(99)));
}

#[test]
fn test_decode_invalid_direction() {
    let mut encoded = CommandPacket::new(1, 1111, CommandPayload::Reset).encode();
    encoded[0] = 0x25;
    assert_eq!(Packet::decode(&encoded), Err(DecodeError::InvalidDirection(0x25)));
}

#[test]
fn test_decode_invalid_checksum() {
    let mut encoded = CommandPacket::new(1, 1111, CommandPayload::PrePrint { cmd_number: 1 }).encode();
    encoded[14] ^= 0xFF;
    assert_eq!(Packet::decode(&encoded), Err(DecodeError::InvalidChecksum));

    // Broken terminator is rejected even with an intact sum
    let mut encoded = CommandPacket::new(1, 1111, CommandPayload::Reset).encode();
    let last = encoded.len() - 1;
    encoded[last] = 0;
    assert_eq!(Packet::decode(&encoded), Err(DecodeError::InvalidChecksum));
}

#[test]
fn test_format_version() {
    assert_eq!(format_version(275), "01.13");
    assert_eq!(format_version(0), "00.00");
    assert_eq!(format_version(0xFFFF), "FF.FF");
}

#[test]
fn test_field_map_projection() {
    let packet = ResponsePacket::new(
        42,
        sample_status(),
        ResponsePayload::ModelName {
            model: "SP-2".to_string(),
        },
    );
    let map = Packet::Response(packet).to_field_map();

    assert_eq!(map["direction"], "response");
    assert_eq!(map["header"]["sessionTime"], 42);
    assert_eq!(map["payload"]["modelName"], "SP-2");
}
