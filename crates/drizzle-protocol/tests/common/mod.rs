//! Scripted in-memory server for driving a `Session` without a network.
//!
//! A `Script` is the exact byte sequence the "server" will send, built
//! packet by packet with the right sequence numbers. Everything the client
//! writes is captured so tests can assert on the commands it sent.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use drizzle_core::Error;
use drizzle_protocol::protocol::writer::{PacketWriter, build_packet_from_payload};
use drizzle_protocol::protocol::{Capabilities, PacketHeader};
use drizzle_protocol::types::FieldType;
use drizzle_protocol::{DrizzleConfig, SocketFactory};

pub const COM_QUIT: u8 = 0x01;
pub const COM_INIT_DB: u8 = 0x02;
pub const COM_QUERY: u8 = 0x03;
pub const COM_PING: u8 = 0x0e;

pub const SCRAMBLE: &[u8; 20] = b"0123456789abcdefghij";

/// Server side of the conversation.
#[derive(Debug, Clone, Default)]
pub struct Script {
    bytes: Vec<u8>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Greeting, OK to the auth packet, then OK for each connect-time
    /// statement (`SET autocommit=1`, plus COM_INIT_DB when `with_db`).
    pub fn connected(capabilities: Capabilities, with_db: bool) -> Self {
        let mut script = Self::new()
            .packet(&greeting(capabilities), 0)
            .packet(&ok(0, 0), 2);
        if with_db {
            script = script.reply(&[ok(0, 0)]);
        }
        script.reply(&[ok(0, 0)])
    }

    /// Append one packet with an explicit sequence number.
    pub fn packet(mut self, payload: &[u8], seq: u8) -> Self {
        let (framed, _) = build_packet_from_payload(payload, seq);
        self.bytes.extend(framed);
        self
    }

    /// Append the response to one command: sequence numbers 1, 2, ...
    pub fn reply(mut self, packets: &[Vec<u8>]) -> Self {
        let mut seq = 1u8;
        for p in packets {
            let (framed, next) = build_packet_from_payload(p, seq);
            self.bytes.extend(framed);
            seq = next;
        }
        self
    }

    /// Append a complete result set response.
    pub fn result_set(self, columns: &[(&str, FieldType)], rows: &[Vec<Option<&str>>]) -> Self {
        let mut packets = vec![vec![u8::try_from(columns.len()).unwrap()]];
        packets.extend(columns.iter().map(|(name, ty)| column_def(name, *ty)));
        packets.push(eof());
        packets.extend(rows.iter().map(|r| row(r)));
        packets.push(eof());
        self.reply(&packets)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Handle on everything the client wrote.
#[derive(Debug, Clone, Default)]
pub struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Client packets as (sequence, payload), in order.
    pub fn packets(&self) -> Vec<(u8, Vec<u8>)> {
        let bytes = self.0.borrow();
        let mut out = Vec::new();
        let mut pos = 0;
        while pos + PacketHeader::SIZE <= bytes.len() {
            let header = PacketHeader::from_bytes(&[
                bytes[pos],
                bytes[pos + 1],
                bytes[pos + 2],
                bytes[pos + 3],
            ]);
            pos += PacketHeader::SIZE;
            let end = pos + header.payload_length as usize;
            out.push((header.sequence_id, bytes[pos..end].to_vec()));
            pos = end;
        }
        out
    }

    /// Commands sent after the auth packet, as (command byte, argument).
    pub fn commands(&self) -> Vec<(u8, String)> {
        self.packets()
            .into_iter()
            .skip(1)
            .map(|(_, p)| (p[0], String::from_utf8_lossy(&p[1..]).into_owned()))
            .collect()
    }

    /// Text of every COM_QUERY sent.
    pub fn queries(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|(cmd, _)| *cmd == COM_QUERY)
            .map(|(_, sql)| sql)
            .collect()
    }
}

/// In-memory transport: reads the script, records writes.
#[derive(Debug)]
pub struct MockStream {
    input: Cursor<Vec<u8>>,
    output: Captured,
    writes_left: Option<usize>,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
            }
            *left -= 1;
        }
        self.output.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Factory handing out one scripted stream.
#[derive(Debug)]
pub struct MockFactory {
    script: Vec<u8>,
    writes_left: Option<usize>,
    pub captured: Captured,
}

impl MockFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: script.into_bytes(),
            writes_left: None,
            captured: Captured::default(),
        }
    }

    /// Let `n` writes through, then fail every write with `BrokenPipe`.
    pub fn failing_writes_after(mut self, n: usize) -> Self {
        self.writes_left = Some(n);
        self
    }
}

impl SocketFactory for MockFactory {
    type Stream = MockStream;

    fn connect(&self, _config: &DrizzleConfig) -> Result<MockStream, Error> {
        Ok(MockStream {
            input: Cursor::new(self.script.clone()),
            output: self.captured.clone(),
            writes_left: self.writes_left,
        })
    }
}

// ==================== Packet builders ====================

/// A greeting offering `capabilities`. Only the low word is sent unless
/// a high-word capability is present.
#[allow(clippy::cast_possible_truncation)]
pub fn greeting(capabilities: Capabilities) -> Vec<u8> {
    greeting_with_plugin(capabilities, "mysql_native_password")
}

/// Like [`greeting`], advertising `plugin` when PLUGIN_AUTH is set.
#[allow(clippy::cast_possible_truncation)]
pub fn greeting_with_plugin(capabilities: Capabilities, plugin: &str) -> Vec<u8> {
    let bits = capabilities.bits();
    let mut w = PacketWriter::new();
    w.write_u8(10);
    w.write_null_string("5.7.44-drizzle");
    w.write_u32_le(77);
    w.write_bytes(&SCRAMBLE[..8]);
    w.write_u8(0);
    w.write_u16_le((bits & 0xFFFF) as u16);
    if bits > 0xFFFF || capabilities.contains(Capabilities::SECURE_CONNECTION) {
        w.write_u8(45);
        w.write_u16_le(0x0002);
        w.write_u16_le((bits >> 16) as u16);
        w.write_u8(21);
        w.write_zeros(10);
        w.write_bytes(&SCRAMBLE[8..]);
        w.write_u8(0);
        if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            w.write_null_string(plugin);
        }
    }
    w.into_bytes()
}

pub fn ok(affected_rows: u64, last_insert_id: u64) -> Vec<u8> {
    ok_with_status(affected_rows, last_insert_id, 0x0002)
}

pub fn ok_with_status(affected_rows: u64, last_insert_id: u64, status: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0x00);
    w.write_lenenc_int(affected_rows);
    w.write_lenenc_int(last_insert_id);
    w.write_u16_le(status);
    w.write_u16_le(0);
    w.into_bytes()
}

pub fn err(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFF);
    w.write_u16_le(code);
    w.write_u8(b'#');
    w.write_bytes(sql_state.as_bytes());
    w.write_bytes(message.as_bytes());
    w.into_bytes()
}

pub fn eof() -> Vec<u8> {
    vec![0xFE, 0x00, 0x00, 0x02, 0x00]
}

pub fn column_def(name: &str, field_type: FieldType) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_lenenc_string("def");
    w.write_lenenc_string("");
    w.write_lenenc_string("");
    w.write_lenenc_string("");
    w.write_lenenc_string(name);
    w.write_lenenc_string("");
    w.write_lenenc_int(0x0C);
    w.write_u16_le(63);
    w.write_u32_le(21);
    w.write_u8(field_type as u8);
    w.write_u16_le(0x0081);
    w.write_u8(0);
    w.write_zeros(2);
    w.into_bytes()
}

pub fn row(cells: &[Option<&str>]) -> Vec<u8> {
    let mut w = PacketWriter::new();
    for cell in cells {
        match cell {
            Some(s) => w.write_lenenc_string(s),
            None => w.write_u8(0xFB),
        }
    }
    w.into_bytes()
}

pub fn config() -> DrizzleConfig {
    DrizzleConfig::new().user("app").password("secret")
}
