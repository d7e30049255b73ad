//! Server greeting and client auth packet.
//!
//! Greeting (protocol version 10):
//! ```text
//! u8        protocol version
//! string\0  server version
//! u32       connection id
//! [8]       scramble part 1
//! u8        filler
//! u16       capabilities (low word)
//! -- optional from here --
//! u8        charset
//! u16       status flags
//! u16       capabilities (high word)
//! u8        auth data length (PLUGIN_AUTH) or 0
//! [10]      reserved
//! [n]       scramble part 2 (SECURE_CONNECTION)
//! string\0  auth plugin name (PLUGIN_AUTH)
//! ```

#![allow(clippy::cast_possible_truncation)]

use drizzle_core::Error;

use crate::auth::plugins;
use crate::protocol::capabilities::Capabilities;
use crate::protocol::reader::PacketReader;
use crate::protocol::writer::PacketWriter;
use crate::protocol::{charset, protocol_error};

/// The only greeting layout this client understands.
pub const PROTOCOL_VERSION: u8 = 10;

/// Parsed server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Capabilities the server offers
    pub capabilities: Capabilities,
    pub charset: u8,
    pub status_flags: u16,
    /// Scramble (parts 1 and 2, trailing NUL removed)
    pub auth_data: Vec<u8>,
    /// Advertised auth plugin, `mysql_native_password` when absent
    pub auth_plugin: String,
}

impl Greeting {
    /// Parse a greeting payload.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);

        let protocol_version = reader
            .read_u8()
            .map_err(|_| protocol_error("Missing protocol version in greeting"))?;
        if protocol_version == 0xFF {
            // Servers refuse connections (too many, host blocked) this way.
            let err = reader.parse_err_packet()?;
            return Err(protocol_error(format!(
                "Server refused connection: {} ({})",
                err.error_message, err.error_code
            )));
        }
        if protocol_version != PROTOCOL_VERSION {
            return Err(protocol_error(format!(
                "Unsupported protocol version: {}",
                protocol_version
            )));
        }

        let server_version = reader
            .read_null_string()
            .map_err(|_| protocol_error("Missing server version in greeting"))?;
        let connection_id = reader
            .read_u32_le()
            .map_err(|_| protocol_error("Missing connection id in greeting"))?;
        let mut auth_data = reader
            .read_bytes(8)
            .map_err(|_| protocol_error("Missing scramble in greeting"))?
            .to_vec();
        reader
            .skip(1)
            .map_err(|_| protocol_error("Missing filler in greeting"))?;
        let caps_lower = reader
            .read_u16_le()
            .map_err(|_| protocol_error("Missing capability flags in greeting"))?;

        let mut greeting = Self {
            protocol_version,
            server_version,
            connection_id,
            capabilities: Capabilities::from_bits_truncate(u32::from(caps_lower)),
            charset: charset::DEFAULT_CHARSET,
            status_flags: 0,
            auth_data: Vec::new(),
            auth_plugin: plugins::MYSQL_NATIVE_PASSWORD.to_string(),
        };

        if reader.is_empty() {
            greeting.auth_data = auth_data;
            return Ok(greeting);
        }

        greeting.charset = reader.read_u8()?;
        greeting.status_flags = reader.read_u16_le()?;
        let caps_upper = reader.read_u16_le()?;
        let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);
        greeting.capabilities = Capabilities::from_bits_truncate(capabilities);

        let auth_data_len = usize::from(reader.read_u8()?);
        reader.skip(10)?;

        if greeting.capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let len2 = auth_data_len.saturating_sub(8).max(13);
            let part2 = reader.read_bytes(len2.min(reader.remaining()))?;
            let part2 = part2.strip_suffix(&[0]).unwrap_or(part2);
            auth_data.extend_from_slice(part2);
        }

        if greeting.capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // Some servers omit the final NUL.
            let name = match reader.read_null_string() {
                Ok(name) => name,
                Err(_) => reader.read_rest_string(),
            };
            if !name.is_empty() {
                greeting.auth_plugin = name;
            }
        }

        greeting.auth_data = auth_data;
        tracing::trace!(
            version = %greeting.server_version,
            connection_id = greeting.connection_id,
            plugin = %greeting.auth_plugin,
            "Parsed greeting"
        );
        Ok(greeting)
    }
}

/// Builder for the 4.1 client auth packet.
#[derive(Debug, Clone)]
pub struct HandshakeResponse<'a> {
    capabilities: Capabilities,
    max_packet_size: u32,
    charset: u8,
    username: &'a str,
    auth_response: &'a [u8],
    database: Option<&'a str>,
    auth_plugin: Option<&'a str>,
}

impl<'a> HandshakeResponse<'a> {
    /// Start an auth packet for `username` with the negotiated capabilities.
    pub fn new(capabilities: Capabilities, username: &'a str) -> Self {
        Self {
            capabilities,
            max_packet_size: crate::protocol::MAX_PACKET_SIZE as u32,
            charset: charset::DEFAULT_CHARSET,
            username,
            auth_response: &[],
            database: None,
            auth_plugin: None,
        }
    }

    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Scrambled credential bytes produced by the auth plugin.
    pub fn auth_response(mut self, response: &'a [u8]) -> Self {
        self.auth_response = response;
        self
    }

    /// Default database, sent when CONNECT_WITH_DB is negotiated.
    pub fn database(mut self, database: Option<&'a str>) -> Self {
        self.database = database;
        self
    }

    /// Plugin name, sent when PLUGIN_AUTH is negotiated.
    pub fn auth_plugin(mut self, plugin: &'a str) -> Self {
        self.auth_plugin = Some(plugin);
        self
    }

    /// Encode the packet payload.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let caps = self.capabilities;
        let mut writer = PacketWriter::with_capacity(64 + self.username.len());

        writer.write_u32_le(caps.bits());
        writer.write_u32_le(self.max_packet_size);
        writer.write_u8(self.charset);
        writer.write_zeros(23);
        writer.write_null_string(self.username);

        if caps.contains(Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            writer.write_lenenc_bytes(self.auth_response);
        } else if caps.contains(Capabilities::SECURE_CONNECTION) {
            let len = u8::try_from(self.auth_response.len()).map_err(|_| {
                protocol_error(format!(
                    "Auth response of {} bytes does not fit a 1-byte length",
                    self.auth_response.len()
                ))
            })?;
            writer.write_u8(len);
            writer.write_bytes(self.auth_response);
        } else {
            writer.write_bytes(self.auth_response);
            writer.write_u8(0);
        }

        if caps.contains(Capabilities::CONNECT_WITH_DB) {
            writer.write_null_string(self.database.unwrap_or(""));
        }

        if caps.contains(Capabilities::PLUGIN_AUTH) {
            writer.write_null_string(self.auth_plugin.unwrap_or(plugins::MYSQL_NATIVE_PASSWORD));
        }

        Ok(writer.into_bytes())
    }
}
