//! Transport provisioning.
//!
//! The session only needs a blocking byte stream. A `SocketFactory` turns
//! a configuration into one; `TcpSocketFactory` is the default. Other
//! factories (TLS wrappers, Unix sockets, in-memory test servers) plug in
//! through `Session::connect_with`.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use drizzle_core::Error;
use drizzle_core::error::{ConnectionError, ConnectionErrorKind};

use crate::config::DrizzleConfig;

/// Opens the byte stream a session runs over.
pub trait SocketFactory {
    type Stream: Read + Write;

    #[allow(clippy::result_large_err)]
    fn connect(&self, config: &DrizzleConfig) -> Result<Self::Stream, Error>;
}

/// Plain TCP with `TCP_NODELAY` and the configured timeouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpSocketFactory;

impl SocketFactory for TcpSocketFactory {
    type Stream = TcpStream;

    fn connect(&self, config: &DrizzleConfig) -> Result<TcpStream, Error> {
        let addr = config.socket_addr();
        let addrs = addr
            .to_socket_addrs()
            .map_err(|e| connect_error(&addr, e))?;

        let mut last_error = None;
        for candidate in addrs {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    // A zero timeout is rejected here as `Error::Io`.
                    stream.set_read_timeout(config.read_timeout)?;
                    stream.set_write_timeout(config.write_timeout)?;
                    tracing::debug!(addr = %candidate, "TCP connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(addr = %candidate, error = %e, "TCP connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let e = last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        });
        Err(connect_error(&addr, e))
    }
}

fn connect_error(addr: &str, e: io::Error) -> Error {
    let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
        ConnectionErrorKind::Refused
    } else {
        ConnectionErrorKind::Connect
    };
    Error::Connection(ConnectionError {
        kind,
        message: format!("Failed to connect to {}: {}", addr, e),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn test_tcp_factory_connects_and_sets_timeouts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = DrizzleConfig::new()
            .host("127.0.0.1")
            .port(port)
            .read_timeout(Duration::from_secs(3));

        let stream = TcpSocketFactory.connect(&config).unwrap();
        assert_eq!(stream.read_timeout().unwrap(), Some(Duration::from_secs(3)));
        assert!(stream.nodelay().unwrap());
    }

    #[test]
    fn test_tcp_factory_rejects_zero_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = DrizzleConfig::new()
            .host("127.0.0.1")
            .port(listener.local_addr().unwrap().port())
            .write_timeout(Duration::ZERO);

        let err = TcpSocketFactory.connect(&config).unwrap_err();
        let Error::Io(io) = &err else {
            panic!("expected an I/O error, got {err:?}");
        };
        assert_eq!(io.kind(), io::ErrorKind::InvalidInput);
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_tcp_factory_refused() {
        // Bind then drop to get a port with no listener.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = DrizzleConfig::new()
            .host("127.0.0.1")
            .port(port)
            .connect_timeout(Duration::from_secs(2));

        let err = TcpSocketFactory.connect(&config).unwrap_err();
        assert!(matches!(
            err.connection_kind(),
            Some(ConnectionErrorKind::Refused | ConnectionErrorKind::Connect)
        ));
        assert!(err.to_string().contains("Failed to connect"));
    }
}
