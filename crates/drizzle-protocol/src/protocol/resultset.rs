//! Text-protocol result set decoding.
//!
//! After a result-set header the server sends, in order:
//!
//! 1. one column-definition packet per column
//! 2. an EOF packet
//! 3. one packet per row, each a list of length-encoded strings
//!    (0xFB for NULL)
//! 4. a terminating EOF packet, or an ERR packet if the statement failed
//!    part way through
//!
//! The whole set is read before anything is returned.

use std::io::{Read, Write};

use drizzle_core::{Error, Value};

use crate::protocol::reader::{NULL_MARKER, PacketReader};
use crate::protocol::response::is_eof_packet;
use crate::protocol::stream::PacketStream;
use crate::protocol::protocol_error;
use crate::result::TabularResult;
use crate::types::{ColumnDescriptor, ColumnFlags, FieldType};

/// Largest capacity reserved up front for column or row vectors.
const PREALLOCATE_LIMIT: usize = 4096;

/// Reads one result set from a stream positioned after its header.
#[derive(Debug)]
pub struct ResultSetStreamer<'s, S> {
    stream: &'s mut PacketStream<S>,
    sql: Option<&'s str>,
}

impl<'s, S: Read + Write> ResultSetStreamer<'s, S> {
    pub fn new(stream: &'s mut PacketStream<S>) -> Self {
        Self { stream, sql: None }
    }

    /// Attach the statement text to any server error raised mid-stream.
    pub fn with_sql(mut self, sql: &'s str) -> Self {
        self.sql = Some(sql);
        self
    }

    /// Read `column_count` definitions, the separator EOF and every row.
    pub fn stream(self, column_count: u64) -> Result<TabularResult, Error> {
        let column_count = usize::try_from(column_count)
            .map_err(|_| protocol_error(format!("Column count {} too large", column_count)))?;

        let mut columns = Vec::with_capacity(column_count.min(PREALLOCATE_LIMIT));
        for index in 0..column_count {
            let packet = self.stream.receive()?;
            if packet.payload.first() == Some(&0xFF) {
                return Err(self.server_error(&packet.payload));
            }
            let column = parse_column_definition(&packet.payload).map_err(|e| {
                tracing::debug!(index, error = %e, "Bad column definition");
                e
            })?;
            columns.push(column);
        }

        let separator = self.stream.receive()?;
        if !is_eof_packet(&separator.payload) {
            return Err(protocol_error(format!(
                "Expected EOF after {} column definitions, got packet starting 0x{:02X}",
                column_count,
                separator.payload.first().copied().unwrap_or(0)
            )));
        }

        let mut rows = Vec::new();
        loop {
            let packet = self.stream.receive()?;
            let payload = packet.payload;

            if is_eof_packet(&payload) {
                let eof = PacketReader::new(&payload).parse_eof_packet()?;
                tracing::trace!(columns = columns.len(), rows = rows.len(), "Result set complete");
                let mut result = TabularResult::new(columns, rows);
                result.warnings = eof.warnings;
                result.status_flags = eof.status_flags;
                return Ok(result);
            }

            if payload.first() == Some(&0xFF) {
                return Err(self.server_error(&payload));
            }

            rows.push(parse_text_row(&payload, &columns)?);
        }
    }

    fn server_error(&self, payload: &[u8]) -> Error {
        match PacketReader::new(payload).parse_err_packet() {
            Ok(err) => Error::Server(err.to_server_error(self.sql)),
            Err(e) => e,
        }
    }
}

/// Decode one column-definition packet (protocol 4.1 layout).
pub fn parse_column_definition(payload: &[u8]) -> Result<ColumnDescriptor, Error> {
    let mut reader = PacketReader::new(payload);

    let catalog = reader.read_lenenc_string()?;
    let schema = reader.read_lenenc_string()?;
    let table = reader.read_lenenc_string()?;
    let org_table = reader.read_lenenc_string()?;
    let name = reader.read_lenenc_string()?;
    let org_name = reader.read_lenenc_string()?;

    // Length of the fixed-size block that follows (always 0x0C).
    let _fixed_len = reader.read_lenenc_int()?;

    let charset = reader.read_u16_le()?;
    let column_length = reader.read_u32_le()?;
    let column_type = FieldType::from_u8(reader.read_u8()?);
    let flags = ColumnFlags::from_bits_truncate(reader.read_u16_le()?);
    let decimals = reader.read_u8()?;

    Ok(ColumnDescriptor {
        catalog,
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        column_length,
        column_type,
        flags,
        decimals,
    })
}

/// Decode one text-protocol row against its column descriptors.
pub fn parse_text_row(payload: &[u8], columns: &[ColumnDescriptor]) -> Result<Vec<Value>, Error> {
    let mut reader = PacketReader::new(payload);
    let mut values = Vec::with_capacity(columns.len());

    for column in columns {
        if reader.peek() == Some(NULL_MARKER) {
            reader.skip(1)?;
            values.push(Value::Null);
        } else {
            let data = reader.read_lenenc_bytes()?;
            values.push(column.decode(data));
        }
    }

    if !reader.is_empty() {
        return Err(protocol_error(format!(
            "Row has {} trailing bytes after {} columns",
            reader.remaining(),
            columns.len()
        )));
    }

    Ok(values)
}
