//! Payload decoding.
//!
//! A [`PacketReader`] walks one payload front to back. Reads that would run
//! past the end fail with `ProtocolErrorKind::Truncated` and leave the
//! position where it was. Text is decoded as lossy UTF-8.

use drizzle_core::Error;
use drizzle_core::error::ProtocolErrorKind;

use crate::protocol::{EofPacket, ErrPacket, OkPacket, protocol_error, protocol_error_kind};

/// Marker byte for a NULL column value in text-protocol rows.
pub const NULL_MARKER: u8 = 0xFB;

/// Cursor over one packet payload.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty, Error> {
                self.array(stringify!($ty)).map(<$ty>::from_le_bytes)
            }
        )*
    };
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], Error> {
        let Some(bytes) = self.data.get(self.pos..).and_then(|rest| rest.get(..len)) else {
            return Err(protocol_error_kind(
                ProtocolErrorKind::Truncated,
                format!(
                    "Truncated {field}: need {len} bytes at offset {}, have {}",
                    self.pos,
                    self.remaining()
                ),
            ));
        };
        self.pos += len;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    /// Consume `marker` if it is the next byte.
    fn eat(&mut self, marker: u8) -> bool {
        let hit = self.peek() == Some(marker);
        if hit {
            self.pos += 1;
        }
        hit
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.array::<1>("u8").map(|[b]| b)
    }

    read_le! {
        read_u16_le -> u16,
        read_u32_le -> u32,
        read_u64_le -> u64,
    }

    pub fn read_u24_le(&mut self) -> Result<u32, Error> {
        let [b0, b1, b2] = self.array("u24")?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    /// Length-encoded integer.
    ///
    /// Fails on 0xFB (NULL) and 0xFF, which are not integers; callers that
    /// accept NULL check [`peek`](Self::peek) first.
    pub fn read_lenenc_int(&mut self) -> Result<u64, Error> {
        let start = self.pos;
        match self.read_u8()? {
            small @ 0x00..=0xFA => Ok(u64::from(small)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            marker => {
                self.pos = start;
                Err(protocol_error(format!(
                    "Invalid length-encoded integer marker 0x{marker:02X} at offset {start}"
                )))
            }
        }
    }

    pub fn read_lenenc_bytes(&mut self) -> Result<&'a [u8], Error> {
        let start = self.pos;
        let len = self.read_lenenc_int()?;
        let result = usize::try_from(len)
            .map_err(|_| protocol_error(format!("Length {len} at offset {start} is too large")))
            .and_then(|len| self.take(len, "length-encoded string"));
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    pub fn read_lenenc_string(&mut self) -> Result<String, Error> {
        self.read_lenenc_bytes().map(lossy)
    }

    /// String up to (and consuming) the next NUL byte.
    pub fn read_null_string(&mut self) -> Result<String, Error> {
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            protocol_error_kind(
                ProtocolErrorKind::Truncated,
                format!("Missing NUL terminator for string at offset {}", self.pos),
            )
        })?;
        self.pos += end + 1;
        Ok(lossy(&rest[..end]))
    }

    pub fn read_string(&mut self, len: usize) -> Result<String, Error> {
        self.take(len, "fixed-length string").map(lossy)
    }

    pub fn read_rest_string(&mut self) -> String {
        lossy(self.read_rest())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.take(len, "bytes")
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.take(n, "skipped bytes").map(drop)
    }

    /// OK body. The leading 0x00 is optional so callers may pass the
    /// payload as received.
    pub fn parse_ok_packet(&mut self) -> Result<OkPacket, Error> {
        self.eat(0x00);
        Ok(OkPacket {
            affected_rows: self.read_lenenc_int()?,
            last_insert_id: self.read_lenenc_int()?,
            status_flags: self.read_u16_le()?,
            warnings: self.read_u16_le()?,
            info: self.read_rest_string(),
        })
    }

    /// ERR body: code, optional `#` plus 5-byte SQL state, message.
    pub fn parse_err_packet(&mut self) -> Result<ErrPacket, Error> {
        self.eat(0xFF);
        let error_code = self.read_u16_le()?;
        let sql_state = if self.eat(b'#') {
            self.read_string(5)?
        } else {
            String::new()
        };
        Ok(ErrPacket {
            error_code,
            sql_state,
            error_message: self.read_rest_string(),
        })
    }

    /// EOF body: warnings then status. A bare 0xFE (pre-4.1) carries
    /// neither.
    pub fn parse_eof_packet(&mut self) -> Result<EofPacket, Error> {
        self.eat(0xFE);
        if self.is_empty() {
            return Ok(EofPacket::default());
        }
        Ok(EofPacket {
            warnings: self.read_u16_le()?,
            status_flags: self.read_u16_le()?,
        })
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
