//! Wire protocol building blocks.
//!
//! Every frame starts with a 4-byte header: a 24-bit little-endian payload
//! length and a sequence byte. A logical packet longer than
//! [`MAX_PACKET_SIZE`] spans several frames; [`stream`] handles that.

pub mod capabilities;
pub mod handshake;
pub mod reader;
pub mod response;
pub mod resultset;
pub mod stream;
pub mod writer;

use drizzle_core::error::{ProtocolError, ProtocolErrorKind, ServerError, ServerErrorKind};
use drizzle_core::Error;

pub use capabilities::Capabilities;
pub use handshake::{Greeting, HandshakeResponse};
pub use reader::PacketReader;
pub use response::{Response, classify};
pub use resultset::ResultSetStreamer;
pub use stream::{Packet, PacketStream};
pub use writer::PacketWriter;

/// Largest payload one frame can carry.
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Command codes (COM_xxx) used by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    InitDb = 0x02,
    Query = 0x03,
    Ping = 0x0e,
}

/// Bits of the status word carried by OK and EOF packets that the
/// session looks at.
pub mod server_status {
    /// A transaction is open.
    pub const SERVER_STATUS_IN_TRANS: u16 = 1;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 1 << 1;
}

/// Collation ids sent in the auth packet.
pub mod charset {
    pub const UTF8MB4_GENERAL_CI: u8 = 45;

    pub const DEFAULT_CHARSET: u8 = UTF8MB4_GENERAL_CI;
}

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// 24-bit payload length
    pub payload_length: u32,
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        let [b0, b1, b2, sequence_id] = *bytes;
        Self {
            payload_length: u32::from_le_bytes([b0, b1, b2, 0]),
            sequence_id,
        }
    }

    /// Encode the header. Bits above the low 24 of the length are dropped.
    pub fn to_bytes(&self) -> [u8; 4] {
        let [b0, b1, b2, _] = self.payload_length.to_le_bytes();
        [b0, b1, b2, self.sequence_id]
    }
}

/// Body of an OK reply (first byte 0x00).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    /// Human-readable info string, possibly empty
    pub info: String,
}

/// Body of an ERR reply (first byte 0xFF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub error_code: u16,
    /// Five-character SQL state; empty when the `#` marker was absent
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Convert to the caller-facing server error, tagged with the statement.
    pub fn to_server_error(&self, sql: Option<&str>) -> ServerError {
        ServerError {
            kind: ServerErrorKind::from_code(self.error_code),
            code: self.error_code,
            sqlstate: (!self.sql_state.is_empty()).then(|| self.sql_state.clone()),
            message: self.error_message.clone(),
            sql: sql.map(str::to_string),
        }
    }
}

/// Body of an EOF marker (0xFE, under 9 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    protocol_error_kind(ProtocolErrorKind::Malformed, msg)
}

pub(crate) fn protocol_error_kind(kind: ProtocolErrorKind, msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        kind,
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

pub(crate) fn unknown_response(payload: &[u8]) -> Error {
    let first = payload.first().map_or_else(
        || "empty payload".to_string(),
        |b| format!("first byte 0x{:02X}", b),
    );
    Error::Protocol(ProtocolError {
        kind: ProtocolErrorKind::UnknownResponse,
        message: format!("Unknown response packet ({})", first),
        raw_data: Some(payload.iter().take(64).copied().collect()),
        source: None,
    })
}
