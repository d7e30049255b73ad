//! Credential transformation for the client auth packet.
//!
//! The handshake never hashes passwords itself. It asks an [`AuthPlugin`]
//! to turn the password and the server's scramble into the auth-response
//! bytes, picked by the plugin name the server advertises (or forced by
//! configuration).
//!
//! # mysql_native_password
//!
//! ```text
//! SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
//! ```
//!
//! # caching_sha2_password (fast path)
//!
//! ```text
//! XOR(SHA256(password), SHA256(SHA256(SHA256(password)) + seed))
//! ```
//!
//! A cached account answers the scramble with AuthMoreData `0x01 0x03`
//! and then the OK; `0x01 0x04` asks for full authentication, which this
//! client cannot perform.

use std::sync::Arc;

use drizzle_core::Error;
use drizzle_core::error::{ConnectionError, ConnectionErrorKind};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::protocol::protocol_error;

/// First byte of an AuthMoreData packet.
pub const AUTH_MORE_DATA: u8 = 0x01;

/// `caching_sha2_password` status bytes carried in AuthMoreData.
pub mod caching_sha2 {
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1-based authentication (legacy default)
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256-based authentication (MySQL 8.0+ default)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// Cleartext password, only sensible over a trusted transport
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// A credential transformation strategy.
pub trait AuthPlugin: std::fmt::Debug + Send + Sync {
    /// Plugin name as sent in the auth packet.
    fn name(&self) -> &'static str;

    /// Compute the auth-response bytes from the password and server seed.
    fn scramble(&self, password: &str, seed: &[u8]) -> Vec<u8>;

    /// React to an AuthMoreData packet (`data` excludes the 0x01 marker).
    ///
    /// `Ok` means the server's final OK or ERR follows. Plugins without an
    /// extra round reject the packet.
    #[allow(clippy::result_large_err)]
    fn more_data(&self, data: &[u8]) -> Result<(), Error> {
        Err(protocol_error(format!(
            "Unexpected auth data for {} ({} bytes)",
            self.name(),
            data.len()
        )))
    }
}

/// `mysql_native_password`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePassword;

impl AuthPlugin for NativePassword {
    fn name(&self) -> &'static str {
        plugins::MYSQL_NATIVE_PASSWORD
    }

    fn scramble(&self, password: &str, seed: &[u8]) -> Vec<u8> {
        if password.is_empty() {
            return vec![];
        }

        // Only the first 20 bytes of the scramble take part.
        let seed = &seed[..seed.len().min(20)];

        let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
        let stage2: [u8; 20] = Sha1::digest(stage1).into();

        let mut hasher = Sha1::new();
        hasher.update(seed);
        hasher.update(stage2);
        let stage3: [u8; 20] = hasher.finalize().into();

        xor(&stage1, &stage3)
    }
}

/// `caching_sha2_password`, fast-auth scramble only.
///
/// Full authentication (RSA key exchange or a secure channel) is not
/// performed; a server that demands it fails the handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachingSha2Password;

impl AuthPlugin for CachingSha2Password {
    fn name(&self) -> &'static str {
        plugins::CACHING_SHA2_PASSWORD
    }

    fn scramble(&self, password: &str, seed: &[u8]) -> Vec<u8> {
        if password.is_empty() {
            return vec![];
        }

        // 20-byte scramble + NUL
        let seed = if seed.len() == 21 && seed.last() == Some(&0) {
            &seed[..20]
        } else {
            seed
        };

        let password_hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        let password_hash_hash: [u8; 32] = Sha256::digest(password_hash).into();

        let mut hasher = Sha256::new();
        hasher.update(password_hash_hash);
        hasher.update(seed);
        let scramble: [u8; 32] = hasher.finalize().into();

        xor(&password_hash, &scramble)
    }

    fn more_data(&self, data: &[u8]) -> Result<(), Error> {
        match data {
            [caching_sha2::FAST_AUTH_SUCCESS] => {
                tracing::debug!("caching_sha2_password fast auth accepted");
                Ok(())
            }
            [caching_sha2::PERFORM_FULL_AUTH] => Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Authentication,
                message: "caching_sha2_password full authentication is not supported".to_string(),
                source: None,
            })),
            _ => Err(protocol_error(format!(
                "Unknown caching_sha2_password auth data {data:02X?}"
            ))),
        }
    }
}

/// `mysql_clear_password`: the password itself, NUL-terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearPassword;

impl AuthPlugin for ClearPassword {
    fn name(&self) -> &'static str {
        plugins::MYSQL_CLEAR_PASSWORD
    }

    fn scramble(&self, password: &str, _seed: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(password.len() + 1);
        result.extend_from_slice(password.as_bytes());
        result.push(0);
        result
    }
}

/// Pick the plugin for a server-advertised name.
///
/// Unknown or empty names fall back to `mysql_native_password`.
pub fn plugin_for(name: &str) -> Arc<dyn AuthPlugin> {
    match name {
        plugins::CACHING_SHA2_PASSWORD => Arc::new(CachingSha2Password),
        plugins::MYSQL_CLEAR_PASSWORD => Arc::new(ClearPassword),
        plugins::MYSQL_NATIVE_PASSWORD => Arc::new(NativePassword),
        other => {
            if !other.is_empty() {
                tracing::warn!(
                    plugin = other,
                    "Unsupported auth plugin, using mysql_native_password"
                );
            }
            Arc::new(NativePassword)
        }
    }
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}
