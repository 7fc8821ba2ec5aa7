//! Per-command payload schemas.
//!
//! One variant per command type in each direction, so payload field access
//! is checked at compile time instead of going through a string-keyed map.
//! Decode offsets are absolute positions in the packet buffer; command
//! payloads start at byte 12, response payloads at byte 16.

use super::packet::{read_u8, read_u16, read_u32};
use super::types::{CMD_HEADER_SIZE, CommandType, RESP_HEADER_SIZE, TRAILER_SIZE};

/// Payload of a client-to-printer command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    Specifications,
    Reset,
    PrepImage { format: u8, options: u8, image_len: u32 },
    SendImage { sequence: u32, data: Vec<u8> },
    CommitImage,
    LockState,
    PrinterLock { lock_state: u8 },
    ChangePassword,
    Version,
    PrintCount,
    ModelName,
    StatusPoll,
    PrePrint { cmd_number: u16 },
}

impl CommandPayload {
    /// The command code this payload belongs to.
    pub fn command_type(&self) -> CommandType {
        match self {
            CommandPayload::Specifications => CommandType::Specifications,
            CommandPayload::Reset => CommandType::Reset,
            CommandPayload::PrepImage { .. } => CommandType::PrepImage,
            CommandPayload::SendImage { .. } => CommandType::SendImage,
            CommandPayload::CommitImage => CommandType::CommitImage,
            CommandPayload::LockState => CommandType::LockState,
            CommandPayload::PrinterLock { .. } => CommandType::PrinterLock,
            CommandPayload::ChangePassword => CommandType::ChangePassword,
            CommandPayload::Version => CommandType::Version,
            CommandPayload::PrintCount => CommandType::PrintCount,
            CommandPayload::ModelName => CommandType::ModelName,
            CommandPayload::StatusPoll => CommandType::StatusPoll,
            CommandPayload::PrePrint { .. } => CommandType::PrePrint,
        }
    }

    /// Append the encoded payload bytes.
    pub(super) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            CommandPayload::PrepImage {
                format,
                options,
                image_len,
            } => {
                buf.push(*format);
                buf.push(*options);
                buf.extend_from_slice(&image_len.to_be_bytes());
                buf.extend_from_slice(&[0; 6]);
            }
            CommandPayload::SendImage { sequence, data } => {
                buf.extend_from_slice(&sequence.to_be_bytes());
                buf.extend_from_slice(data);
            }
            CommandPayload::PrinterLock { lock_state } => {
                buf.push(*lock_state);
                buf.extend_from_slice(&[0; 3]);
            }
            CommandPayload::PrePrint { cmd_number } => {
                buf.extend_from_slice(&[0; 2]);
                buf.extend_from_slice(&cmd_number.to_be_bytes());
            }
            _ => {}
        }
    }

    /// Decode the payload for `command` from a full packet buffer.
    pub(super) fn decode(command: CommandType, buf: &[u8]) -> Self {
        match command {
            CommandType::Specifications => CommandPayload::Specifications,
            CommandType::Reset => CommandPayload::Reset,
            CommandType::PrepImage => CommandPayload::PrepImage {
                format: read_u8(buf, 12),
                options: read_u8(buf, 13),
                image_len: read_u32(buf, 14),
            },
            CommandType::SendImage => {
                let end = buf.len().saturating_sub(TRAILER_SIZE);
                let data = buf
                    .get(CMD_HEADER_SIZE + 4..end)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();
                CommandPayload::SendImage {
                    sequence: read_u32(buf, 12),
                    data,
                }
            }
            CommandType::CommitImage => CommandPayload::CommitImage,
            CommandType::LockState => CommandPayload::LockState,
            CommandType::PrinterLock => CommandPayload::PrinterLock {
                lock_state: read_u8(buf, 12),
            },
            CommandType::ChangePassword => CommandPayload::ChangePassword,
            CommandType::Version => CommandPayload::Version,
            CommandType::PrintCount => CommandPayload::PrintCount,
            CommandType::ModelName => CommandPayload::ModelName,
            CommandType::StatusPoll => CommandPayload::StatusPoll,
            CommandType::PrePrint => CommandPayload::PrePrint {
                cmd_number: read_u16(buf, 14),
            },
        }
    }
}

/// Payload of a printer-to-client response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    Specifications {
        max_width: u16,
        max_height: u16,
        max_colours: u16,
        unknown1: u16,
        max_msg_size: u16,
        unknown2: u8,
        unknown3: u32,
    },
    Reset,
    PrepImage {
        max_segment_len: u16,
    },
    /// Echoes the low byte of the segment's sequence number.
    SendImage {
        sequence: u8,
    },
    CommitImage,
    LockState {
        lock_state: u32,
    },
    PrinterLock,
    ChangePassword,
    Version {
        unknown1: u16,
        firmware: u16,
        hardware: u16,
    },
    PrintCount {
        print_history: u32,
    },
    ModelName {
        model: String,
    },
    StatusPoll,
    PrePrint {
        cmd_number: u16,
        resp_number: u16,
    },
}

impl ResponsePayload {
    /// The command code this payload belongs to.
    pub fn command_type(&self) -> CommandType {
        match self {
            ResponsePayload::Specifications { .. } => CommandType::Specifications,
            ResponsePayload::Reset => CommandType::Reset,
            ResponsePayload::PrepImage { .. } => CommandType::PrepImage,
            ResponsePayload::SendImage { .. } => CommandType::SendImage,
            ResponsePayload::CommitImage => CommandType::CommitImage,
            ResponsePayload::LockState { .. } => CommandType::LockState,
            ResponsePayload::PrinterLock => CommandType::PrinterLock,
            ResponsePayload::ChangePassword => CommandType::ChangePassword,
            ResponsePayload::Version { .. } => CommandType::Version,
            ResponsePayload::PrintCount { .. } => CommandType::PrintCount,
            ResponsePayload::ModelName { .. } => CommandType::ModelName,
            ResponsePayload::StatusPoll => CommandType::StatusPoll,
            ResponsePayload::PrePrint { .. } => CommandType::PrePrint,
        }
    }

    /// Append the encoded payload bytes.
    pub(super) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ResponsePayload::Specifications {
                max_width,
                max_height,
                max_colours,
                unknown1,
                max_msg_size,
                unknown2,
                unknown3,
            } => {
                buf.extend_from_slice(&max_width.to_be_bytes());
                buf.extend_from_slice(&max_height.to_be_bytes());
                buf.extend_from_slice(&max_colours.to_be_bytes());
                buf.extend_from_slice(&unknown1.to_be_bytes());
                buf.extend_from_slice(&[0; 4]);
                buf.extend_from_slice(&max_msg_size.to_be_bytes());
                buf.push(*unknown2);
                buf.push(0);
                buf.extend_from_slice(&unknown3.to_be_bytes());
                buf.extend_from_slice(&[0; 8]);
            }
            ResponsePayload::PrepImage { max_segment_len } => {
                buf.extend_from_slice(&[0; 2]);
                buf.extend_from_slice(&max_segment_len.to_be_bytes());
            }
            ResponsePayload::SendImage { sequence } => {
                buf.extend_from_slice(&[0; 3]);
                buf.push(*sequence);
            }
            ResponsePayload::LockState { lock_state } => {
                buf.extend_from_slice(&lock_state.to_be_bytes());
            }
            ResponsePayload::Version {
                unknown1,
                firmware,
                hardware,
            } => {
                buf.extend_from_slice(&unknown1.to_be_bytes());
                buf.extend_from_slice(&firmware.to_be_bytes());
                buf.extend_from_slice(&hardware.to_be_bytes());
                buf.extend_from_slice(&[0; 2]);
            }
            ResponsePayload::PrintCount { print_history } => {
                buf.extend_from_slice(&print_history.to_be_bytes());
                buf.extend_from_slice(&[0; 12]);
            }
            ResponsePayload::ModelName { model } => {
                buf.extend_from_slice(model.as_bytes());
            }
            ResponsePayload::PrePrint {
                cmd_number,
                resp_number,
            } => {
                buf.extend_from_slice(&cmd_number.to_be_bytes());
                buf.extend_from_slice(&resp_number.to_be_bytes());
            }
            _ => {}
        }
    }

    /// Decode the payload for `command` from a full packet buffer.
    pub(super) fn decode(command: CommandType, buf: &[u8]) -> Self {
        match command {
            CommandType::Specifications => ResponsePayload::Specifications {
                max_width: read_u16(buf, 16),
                max_height: read_u16(buf, 18),
                max_colours: read_u16(buf, 20),
                unknown1: read_u16(buf, 22),
                max_msg_size: read_u16(buf, 28),
                unknown2: read_u8(buf, 30),
                unknown3: read_u32(buf, 32),
            },
            CommandType::Reset => ResponsePayload::Reset,
            CommandType::PrepImage => ResponsePayload::PrepImage {
                max_segment_len: read_u16(buf, 18),
            },
            CommandType::SendImage => ResponsePayload::SendImage {
                sequence: read_u8(buf, 19),
            },
            CommandType::CommitImage => ResponsePayload::CommitImage,
            CommandType::LockState => ResponsePayload::LockState {
                lock_state: read_u32(buf, 16),
            },
            CommandType::PrinterLock => ResponsePayload::PrinterLock,
            CommandType::ChangePassword => ResponsePayload::ChangePassword,
            CommandType::Version => ResponsePayload::Version {
                unknown1: read_u16(buf, 16),
                firmware: read_u16(buf, 18),
                hardware: read_u16(buf, 20),
            },
            CommandType::PrintCount => ResponsePayload::PrintCount {
                print_history: read_u32(buf, 16),
            },
            CommandType::ModelName => {
                let end = buf.len().saturating_sub(TRAILER_SIZE);
                let model = buf
                    .get(RESP_HEADER_SIZE..end)
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                ResponsePayload::ModelName { model }
            }
            CommandType::StatusPoll => ResponsePayload::StatusPoll,
            CommandType::PrePrint => ResponsePayload::PrePrint {
                cmd_number: read_u16(buf, 16),
                resp_number: read_u16(buf, 18),
            },
        }
    }
}
