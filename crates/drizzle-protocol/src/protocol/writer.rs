//! Payload encoding: the mirror image of [`PacketReader`].
//!
//! Nothing here validates ranges or character sets; every `write_*`
//! appends exactly the bytes it is given.
//!
//! [`PacketReader`]: crate::protocol::reader::PacketReader

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// Growable payload buffer.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

macro_rules! write_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: $ty) {
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::with_capacity(128)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    write_le! {
        write_u16_le: u16,
        write_u32_le: u32,
        write_u64_le: u64,
    }

    /// Low three bytes of `value`.
    pub fn write_u24_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Length-encoded integer in its shortest form.
    pub fn write_lenenc_int(&mut self, value: u64) {
        let bytes = value.to_le_bytes();
        match value {
            0..=250 => self.buffer.push(bytes[0]),
            251..=0xFFFF => {
                self.buffer.push(0xFC);
                self.buffer.extend_from_slice(&bytes[..2]);
            }
            0x1_0000..=0xFF_FFFF => {
                self.buffer.push(0xFD);
                self.buffer.extend_from_slice(&bytes[..3]);
            }
            _ => {
                self.buffer.push(0xFE);
                self.buffer.extend_from_slice(&bytes);
            }
        }
    }

    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.write_bytes(data);
    }

    /// `s` followed by a NUL byte.
    pub fn write_null_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// `count` zero bytes of filler.
    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }
}

/// Frame a payload as one or more packets starting at `sequence_id`.
///
/// Payloads of `MAX_PACKET_SIZE` or more are split into max-size frames
/// with consecutive sequence numbers; an exact multiple is terminated by
/// an empty frame. Returns the framed bytes and the next sequence number.
pub fn build_packet_from_payload(payload: &[u8], mut sequence_id: u8) -> (Vec<u8>, u8) {
    let frames = payload.len() / MAX_PACKET_SIZE + 1;
    let mut result = Vec::with_capacity(payload.len() + frames * PacketHeader::SIZE);

    let mut offset = 0;
    loop {
        let chunk_len = (payload.len() - offset).min(MAX_PACKET_SIZE);
        #[allow(clippy::cast_possible_truncation)]
        let header = PacketHeader {
            payload_length: chunk_len as u32,
            sequence_id,
        };
        result.extend_from_slice(&header.to_bytes());
        result.extend_from_slice(&payload[offset..offset + chunk_len]);
        offset += chunk_len;
        sequence_id = sequence_id.wrapping_add(1);

        // A short frame (including the empty terminator) ends the message.
        if chunk_len < MAX_PACKET_SIZE {
            break;
        }
    }

    (result, sequence_id)
}

/// Build a command payload: the command byte followed by its argument.
pub fn build_command_payload(command: u8, argument: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(1 + argument.len());
    writer.write_u8(command);
    writer.write_bytes(argument);
    writer.into_bytes()
}
