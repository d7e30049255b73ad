//! Packet framing over a blocking byte stream.
//!
//! `PacketStream` owns the transport and tracks the sequence number of
//! the current request/response cycle. Every top-level command starts by
//! resetting the sequence to 0; each packet sent or received advances it
//! by one (mod 256). A received packet carrying any other sequence number
//! means the two sides disagree on stream position, which is fatal.

use std::io::{self, BufReader, Read, Write};

use drizzle_core::Error;
use drizzle_core::error::{ConnectionError, ConnectionErrorKind, ProtocolErrorKind};

use crate::protocol::writer::build_packet_from_payload;
use crate::protocol::{MAX_PACKET_SIZE, PacketHeader, protocol_error_kind};

/// Buffer size for reads from the transport.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// One logical packet: payload plus the sequence number of its first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub payload: Vec<u8>,
    pub sequence_id: u8,
}

/// Length-prefixed, sequence-numbered framing over `S`.
pub struct PacketStream<S> {
    inner: BufReader<S>,
    sequence_id: u8,
}

impl<S> std::fmt::Debug for PacketStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("sequence_id", &self.sequence_id)
            .finish_non_exhaustive()
    }
}

impl<S: Read + Write> PacketStream<S> {
    /// Wrap a connected transport.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_BUFFER_SIZE, stream),
            sequence_id: 0,
        }
    }

    /// The sequence number the next packet will carry.
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Start a new request/response cycle.
    pub fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Frame `payload` starting at `sequence_id`, write it and flush.
    ///
    /// The tracked sequence continues after the last frame written.
    pub fn send_packet(&mut self, payload: &[u8], sequence_id: u8) -> Result<(), Error> {
        let (bytes, next) = build_packet_from_payload(payload, sequence_id);
        tracing::trace!(
            len = payload.len(),
            seq = sequence_id,
            "Sending packet"
        );

        let stream = self.inner.get_mut();
        stream
            .write_all(&bytes)
            .map_err(|e| io_error("Failed to write packet", e))?;
        stream
            .flush()
            .map_err(|e| io_error("Failed to flush stream", e))?;

        self.sequence_id = next;
        Ok(())
    }

    /// Send `payload` with the tracked sequence number.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.send_packet(payload, self.sequence_id)
    }

    /// Read one logical packet without checking its sequence number.
    pub fn receive_packet(&mut self) -> Result<Packet, Error> {
        self.read_logical(None)
    }

    /// Read one logical packet, requiring the tracked sequence number.
    pub fn receive(&mut self) -> Result<Packet, Error> {
        self.read_logical(Some(self.sequence_id))
    }

    fn read_logical(&mut self, expected: Option<u8>) -> Result<Packet, Error> {
        let (header, mut payload) = self.read_frame(expected)?;
        let first_sequence = header.sequence_id;
        let mut last = header;

        // Max-size frames continue into the next one.
        while last.payload_length as usize == MAX_PACKET_SIZE {
            let (cont, more) = self.read_frame(Some(last.sequence_id.wrapping_add(1)))?;
            payload.extend_from_slice(&more);
            last = cont;
        }

        self.sequence_id = last.sequence_id.wrapping_add(1);
        tracing::trace!(len = payload.len(), seq = first_sequence, "Received packet");

        Ok(Packet {
            payload,
            sequence_id: first_sequence,
        })
    }

    fn read_frame(&mut self, expected: Option<u8>) -> Result<(PacketHeader, Vec<u8>), Error> {
        let mut header_buf = [0u8; PacketHeader::SIZE];
        self.inner
            .read_exact(&mut header_buf)
            .map_err(|e| io_error("Failed to read packet header", e))?;
        let header = PacketHeader::from_bytes(&header_buf);

        if let Some(expected) = expected {
            if header.sequence_id != expected {
                return Err(protocol_error_kind(
                    ProtocolErrorKind::Desync,
                    format!(
                        "Packet sequence mismatch: expected {}, got {}",
                        expected, header.sequence_id
                    ),
                ));
            }
        }

        let mut payload = vec![0u8; header.payload_length as usize];
        self.inner
            .read_exact(&mut payload)
            .map_err(|e| io_error("Failed to read packet payload", e))?;

        Ok((header, payload))
    }
}

fn io_error(context: &str, e: io::Error) -> Error {
    let message = if e.kind() == io::ErrorKind::UnexpectedEof {
        format!("{}: server closed the connection", context)
    } else {
        format!("{}: {}", context, e)
    };
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message,
        source: Some(Box::new(e)),
    })
}
