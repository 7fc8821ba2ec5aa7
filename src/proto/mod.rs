//! Instax SP wire protocol: packet framing, checksum and payload codecs.
//!
//! Every exchange is a single command packet answered by a single response
//! packet. Both share a length-prefixed header, a 16-bit one's-complement
//! checksum and a CR LF terminator.

mod packet;
mod payload;
mod types;

#[cfg(test)]
mod tests;

pub use packet::{CommandPacket, DecodeError, DeviceStatus, Packet, ResponsePacket, format_version};
pub(crate) use packet::hex_preview;
pub use payload::{CommandPayload, ResponsePayload};
pub use types::{
    CMD_HEADER_SIZE, COMMAND_TAG, CommandType, FRAME_PREFIX_SIZE, MAX_PACKET_SIZE, RESP_HEADER_SIZE, RESPONSE_TAG,
    ReturnCode, TRAILER_SIZE,
};
