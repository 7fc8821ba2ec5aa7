//! Packet framing: header layout, checksum and whole-packet encode/decode.

use serde_json::{Value, json};
use thiserror::Error;

use super::payload::{CommandPayload, ResponsePayload};
use super::types::{
    CMD_HEADER_SIZE, COMMAND_TAG, CommandType, FRAME_PREFIX_SIZE, RESP_HEADER_SIZE, RESPONSE_TAG, ReturnCode,
    TRAILER_SIZE,
};

/// Why a byte buffer could not be decoded into a packet.
///
/// These are values, not faults: anomalous traffic is reported to the caller
/// so it can log the raw bytes and decide whether to retry or abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is shorter than the minimum header or does not match the
    /// declared total length.
    #[error("truncated packet: expected {expected} bytes, have {actual}")]
    TruncatedPacket { expected: usize, actual: usize },

    /// First byte is neither the command nor the response tag.
    #[error("invalid direction tag: {0:#04x}")]
    InvalidDirection(u8),

    /// Command byte outside the closed command set.
    #[error("unknown command type: {0}")]
    UnknownCommandType(u8),

    /// Checksum or CR LF terminator mismatch.
    #[error("invalid checksum or terminator")]
    InvalidChecksum,
}

/// One's-complement 16-bit checksum over `data`.
pub(crate) fn checksum(data: &[u8]) -> u16 {
    let sum: u32 = data.iter().map(|&b| u32::from(b)).sum();
    !sum as u16
}

/// Validate the checksum and CR LF terminator of a complete packet buffer.
///
/// The stored checksum must satisfy `(sum + stored) & 0xFFFF == 0xFFFF`
/// where `sum` covers everything before the trailer.
pub fn validate_trailer(buf: &[u8]) -> bool {
    if buf.len() < TRAILER_SIZE {
        return false;
    }
    let body_len = buf.len() - TRAILER_SIZE;
    let sum: u32 = buf[..body_len].iter().map(|&b| u32::from(b)).sum();
    let stored = u32::from(u16::from_be_bytes([buf[body_len], buf[body_len + 1]]));
    let terminated = buf[body_len + 2] == 13 && buf[body_len + 3] == 10;
    terminated && (sum + stored) & 0xFFFF == 0xFFFF
}

/// Read a byte at `offset`, or 0 past the end.
pub(super) fn read_u8(buf: &[u8], offset: usize) -> u8 {
    buf.get(offset).copied().unwrap_or(0)
}

/// Read a big-endian u16 at `offset`, or 0 past the end.
pub(super) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    match buf.get(offset..offset + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]),
        None => 0,
    }
}

/// Read a big-endian u32 at `offset`, or 0 past the end.
pub(super) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    match buf.get(offset..offset + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

/// Printer state carried in every response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub return_code: ReturnCode,
    /// Paper-eject mechanism state, 3 bits.
    pub ejecting: u8,
    /// Battery level, 3 bits.
    pub battery: u8,
    /// Prints left in the cartridge, 4 bits.
    pub prints_remaining: u8,
}

impl DeviceStatus {
    pub fn new(return_code: ReturnCode, ejecting: u8, battery: u8, prints_remaining: u8) -> Self {
        Self {
            return_code,
            ejecting: ejecting & 0x07,
            battery: battery & 0x07,
            prints_remaining: prints_remaining & 0x0F,
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let packed = read_u8(buf, 15);
        Self {
            return_code: ReturnCode::from_code(read_u8(buf, 12)),
            ejecting: (read_u8(buf, 14) >> 2) & 0x07,
            battery: (packed >> 4) & 0x07,
            prints_remaining: packed & 0x0F,
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.return_code.code());
        buf.push(0);
        buf.push((self.ejecting & 0x07) << 2);
        buf.push((self.battery & 0x07) << 4 | self.prints_remaining & 0x0F);
    }
}

/// A client-to-printer command, ready to encode or freshly decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    pub session_time: u32,
    pub pin_code: u16,
    pub payload: CommandPayload,
}

impl CommandPacket {
    pub fn new(session_time: u32, pin_code: u16, payload: CommandPayload) -> Self {
        Self {
            session_time,
            pin_code,
            payload,
        }
    }

    pub fn command(&self) -> CommandType {
        self.payload.command_type()
    }

    /// Encode into a fresh wire buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        body.push(COMMAND_TAG);
        body.push(self.command().code());
        body.extend_from_slice(&[0, 0]); // totalLength backfilled below
        body.extend_from_slice(&self.session_time.to_be_bytes());
        body.extend_from_slice(&self.pin_code.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        self.payload.encode(&mut body);

        finish_packet(body)
    }
}

/// A printer-to-client response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub session_time: u32,
    pub status: DeviceStatus,
    pub payload: ResponsePayload,
}

impl ResponsePacket {
    pub fn new(session_time: u32, status: DeviceStatus, payload: ResponsePayload) -> Self {
        Self {
            session_time,
            status,
            payload,
        }
    }

    pub fn command(&self) -> CommandType {
        self.payload.command_type()
    }

    /// Encode into a fresh wire buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        body.push(RESPONSE_TAG);
        body.push(self.command().code());
        body.extend_from_slice(&[0, 0]); // totalLength backfilled below
        body.extend_from_slice(&self.session_time.to_be_bytes());
        body.extend_from_slice(&[0; 4]);
        self.status.encode(&mut body);
        self.payload.encode(&mut body);

        finish_packet(body)
    }
}

/// Backfill the length field, then append checksum and terminator.
fn finish_packet(mut body: Vec<u8>) -> Vec<u8> {
    let total = (body.len() + TRAILER_SIZE) as u16;
    body[2..4].copy_from_slice(&total.to_be_bytes());
    let check = checksum(&body);
    body.extend_from_slice(&check.to_be_bytes());
    body.push(13);
    body.push(10);
    body
}

/// A decoded packet of either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Command(CommandPacket),
    Response(ResponsePacket),
}

impl Packet {
    /// Decode a complete wire buffer into a typed packet.
    pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
        if buf.len() < FRAME_PREFIX_SIZE {
            return Err(DecodeError::TruncatedPacket {
                expected: FRAME_PREFIX_SIZE,
                actual: buf.len(),
            });
        }

        let tag = buf[0];
        let min_size = match tag {
            COMMAND_TAG => CMD_HEADER_SIZE + TRAILER_SIZE,
            RESPONSE_TAG => RESP_HEADER_SIZE + TRAILER_SIZE,
            other => return Err(DecodeError::InvalidDirection(other)),
        };

        let total = usize::from(read_u16(buf, 2));
        if total < min_size || buf.len() != total {
            return Err(DecodeError::TruncatedPacket {
                expected: total.max(min_size),
                actual: buf.len(),
            });
        }

        let command = CommandType::try_from(buf[1]).map_err(DecodeError::UnknownCommandType)?;

        if !validate_trailer(buf) {
            return Err(DecodeError::InvalidChecksum);
        }

        let session_time = read_u32(buf, 4);
        let packet = if tag == COMMAND_TAG {
            Packet::Command(CommandPacket {
                session_time,
                pin_code: read_u16(buf, 8),
                payload: CommandPayload::decode(command, buf),
            })
        } else {
            Packet::Response(ResponsePacket {
                session_time,
                status: DeviceStatus::decode(buf),
                payload: ResponsePayload::decode(command, buf),
            })
        };
        Ok(packet)
    }

    pub fn command(&self) -> CommandType {
        match self {
            Packet::Command(cmd) => cmd.command(),
            Packet::Response(resp) => resp.command(),
        }
    }

    pub fn session_time(&self) -> u32 {
        match self {
            Packet::Command(cmd) => cmd.session_time,
            Packet::Response(resp) => resp.session_time,
        }
    }

    /// Project the packet into a plain field map for the JSON message log.
    pub fn to_field_map(&self) -> Value {
        match self {
            Packet::Command(cmd) => json!({
                "direction": "command",
                "type": cmd.command().to_string(),
                "header": {
                    "command": cmd.command().code(),
                    "sessionTime": cmd.session_time,
                    "pinCode": cmd.pin_code,
                },
                "payload": payload_fields_command(&cmd.payload),
            }),
            Packet::Response(resp) => json!({
                "direction": "response",
                "type": resp.command().to_string(),
                "header": {
                    "command": resp.command().code(),
                    "sessionTime": resp.session_time,
                    "returnCode": resp.status.return_code.code(),
                    "ejecting": resp.status.ejecting,
                    "battery": resp.status.battery,
                    "printsRemaining": resp.status.prints_remaining,
                },
                "payload": payload_fields_response(&resp.payload),
            }),
        }
    }
}

fn payload_fields_command(payload: &CommandPayload) -> Value {
    match payload {
        CommandPayload::PrepImage {
            format,
            options,
            image_len,
        } => json!({ "format": format, "options": options, "imgLength": image_len }),
        CommandPayload::SendImage { sequence, data } => json!({
            "sequenceNumber": sequence,
            "payloadBytes": hex_preview(data),
            "payloadLength": data.len(),
        }),
        CommandPayload::PrinterLock { lock_state } => json!({ "lockState": lock_state }),
        CommandPayload::PrePrint { cmd_number } => json!({ "cmdNumber": cmd_number }),
        _ => json!({}),
    }
}

fn payload_fields_response(payload: &ResponsePayload) -> Value {
    match payload {
        ResponsePayload::Specifications {
            max_width,
            max_height,
            max_colours,
            unknown1,
            max_msg_size,
            unknown2,
            unknown3,
        } => json!({
            "maxWidth": max_width,
            "maxHeight": max_height,
            "maxColours": max_colours,
            "unknown1": unknown1,
            "maxMsgSize": max_msg_size,
            "unknown2": unknown2,
            "unknown3": unknown3,
        }),
        ResponsePayload::PrepImage { max_segment_len } => json!({ "maxLen": max_segment_len }),
        ResponsePayload::SendImage { sequence } => json!({ "sequenceNumber": sequence }),
        ResponsePayload::LockState { lock_state } => json!({ "lockState": lock_state }),
        ResponsePayload::Version {
            unknown1,
            firmware,
            hardware,
        } => json!({
            "unknown1": unknown1,
            "firmware": format_version(*firmware),
            "hardware": format_version(*hardware),
        }),
        ResponsePayload::PrintCount { print_history } => json!({ "printHistory": print_history }),
        ResponsePayload::ModelName { model } => json!({ "modelName": model }),
        ResponsePayload::PrePrint {
            cmd_number,
            resp_number,
        } => json!({ "cmdNumber": cmd_number, "respNumber": resp_number }),
        _ => json!({}),
    }
}

/// Format a firmware/hardware version word as the printer's "HH.LL" hex pair.
pub fn format_version(word: u16) -> String {
    format!("{:02X}.{:02X}", word >> 8, word & 0xFF)
}

/// Hex dump in 2-byte groups, truncated for display.
pub(crate) fn hex_preview(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(84);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02x}"));
        if out.len() >= 80 {
            out.push_str("..");
            break;
        }
    }
    out
}
