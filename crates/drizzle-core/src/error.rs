//! Error types for drizzle-rs operations.

use std::fmt;

/// The primary error type for all protocol and session operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, authentication, disconnect)
    Connection(ConnectionError),
    /// Protocol errors (wire-level framing and shape mismatches)
    Protocol(ProtocolError),
    /// The server answered a request with an ERR packet
    Server(ServerError),
    /// Invalid configuration or connection URL
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: BoxedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish the transport
    Connect,
    /// Connection refused by the remote host
    Refused,
    /// Server rejected the credentials or capabilities
    Authentication,
    /// Transport read or write failed mid-session
    Disconnected,
    /// The session was already closed
    Closed,
    /// An earlier fatal error left the session unusable
    Broken,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: BoxedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Packet did not have the expected shape
    Malformed,
    /// Decoding ran past the end of the available bytes
    Truncated,
    /// Sequence number did not match the tracked value
    Desync,
    /// First byte of a response matched no known sentinel
    UnknownResponse,
}

/// An ERR packet returned by the server for a request.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub kind: ServerErrorKind,
    /// Server error number (e.g. 1064)
    pub code: u16,
    /// Five-character SQL state, when the server sent one
    pub sqlstate: Option<String>,
    pub message: String,
    /// Statement that triggered the error, if known
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Unknown database, table or column
    NotFound,
    /// Access denied
    Permission,
    /// Deadlock or lock wait timeout
    Deadlock,
    /// Other database error
    Database,
}

impl ServerErrorKind {
    /// Classify a server error number.
    pub fn from_code(code: u16) -> Self {
        match code {
            1062 | 1216 | 1217 | 1451 | 1452 | 1048 | 3819 => ServerErrorKind::Constraint,
            1064 | 1149 => ServerErrorKind::Syntax,
            1046 | 1049 | 1051 | 1054 | 1146 => ServerErrorKind::NotFound,
            1044 | 1045 | 1142 | 1143 | 1227 => ServerErrorKind::Permission,
            1205 | 1213 => ServerErrorKind::Deadlock,
            _ => ServerErrorKind::Database,
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: BoxedSource,
}

impl Error {
    /// Does this error leave the connection untrustworthy?
    ///
    /// Only a server-reported error keeps the session usable.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, Error::Server(_) | Error::Config(_))
    }

    /// Was this reported by the server through an ERR packet?
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Server(_))
    }

    /// Is this an authentication failure?
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Authentication,
                ..
            })
        )
    }

    /// Get the protocol error kind, if this is a protocol error.
    pub fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            Error::Protocol(p) => Some(p.kind),
            _ => None,
        }
    }

    /// Get the connection error kind, if this is a connection error.
    pub fn connection_kind(&self) -> Option<ConnectionErrorKind> {
        match self {
            Error::Connection(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23000" for a duplicate key)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(s) => s.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the server error number if available
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Server(s) => Some(s.code),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Server(s) => s.sql.as_deref(),
            _ => None,
        }
    }
}

impl ServerError {
    /// Is this a duplicate key violation?
    pub fn is_duplicate_key(&self) -> bool {
        self.code == 1062
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.code == 1451 || self.code == 1452
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {e}"),
            Error::Protocol(e) => write!(f, "Protocol error: {e}"),
            Error::Server(e) => write!(f, "Server error {e}"),
            Error::Config(e) => write!(f, "Configuration error: {e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

/// Underlying cause attached to an error.
pub type BoxedSource = Option<Box<dyn std::error::Error + Send + Sync>>;

fn as_source(source: &BoxedSource) -> Option<&(dyn std::error::Error + 'static)> {
    source
        .as_deref()
        .map(|e| e as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => as_source(&e.source),
            Error::Protocol(e) => as_source(&e.source),
            Error::Config(e) => as_source(&e.source),
            Error::Io(e) => Some(e),
            Error::Server(_) => None,
        }
    }
}

/// Errors whose text is just their message.
macro_rules! message_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.message)
                }
            }
        )*
    };
}

message_display!(ConnectionError, ProtocolError, ConfigError);

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(state) => write!(f, "{} ({state}): {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

macro_rules! error_from {
    ($($variant:ident($ty:ty)),*) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

error_from!(
    Connection(ConnectionError),
    Protocol(ProtocolError),
    Server(ServerError),
    Config(ConfigError),
    Io(std::io::Error)
);

/// Result type alias for drizzle-rs operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server(code: u16) -> ServerError {
        ServerError {
            kind: ServerErrorKind::from_code(code),
            code,
            sqlstate: Some("23000".to_string()),
            message: "Duplicate entry '1' for key 'PRIMARY'".to_string(),
            sql: Some("INSERT INTO t VALUES (1)".to_string()),
        }
    }

    #[test]
    fn server_error_helpers() {
        let dup = server(1062);
        assert!(dup.is_duplicate_key());
        assert!(!dup.is_foreign_key_violation());
        assert_eq!(dup.kind, ServerErrorKind::Constraint);

        let err = Error::Server(dup);
        assert_eq!(err.sqlstate(), Some("23000"));
        assert_eq!(err.server_code(), Some(1062));
        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (1)"));
        assert!(err.is_server_error());
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn fatal_classification() {
        let desync = Error::Protocol(ProtocolError {
            kind: ProtocolErrorKind::Desync,
            message: "expected sequence 1, got 3".to_string(),
            raw_data: None,
            source: None,
        });
        assert!(desync.is_connection_fatal());
        assert_eq!(desync.protocol_kind(), Some(ProtocolErrorKind::Desync));

        let auth = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Authentication,
            message: "Access denied".to_string(),
            source: None,
        });
        assert!(auth.is_auth_error());
        assert!(auth.is_connection_fatal());

        let io = Error::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(io.is_connection_fatal());
        assert!(std::error::Error::source(&io).is_some());
    }

    #[test]
    fn display_formats() {
        let err = Error::Server(server(1062));
        assert_eq!(
            err.to_string(),
            "Server error 1062 (23000): Duplicate entry '1' for key 'PRIMARY'"
        );

        let no_state = ServerError {
            kind: ServerErrorKind::Syntax,
            code: 1064,
            sqlstate: None,
            message: "You have an error in your SQL syntax".to_string(),
            sql: None,
        };
        assert_eq!(no_state.to_string(), "1064: You have an error in your SQL syntax");
    }

    #[test]
    fn error_kind_from_code() {
        assert_eq!(ServerErrorKind::from_code(1064), ServerErrorKind::Syntax);
        assert_eq!(ServerErrorKind::from_code(1146), ServerErrorKind::NotFound);
        assert_eq!(ServerErrorKind::from_code(1045), ServerErrorKind::Permission);
        assert_eq!(ServerErrorKind::from_code(1213), ServerErrorKind::Deadlock);
        assert_eq!(ServerErrorKind::from_code(9999), ServerErrorKind::Database);
    }
}
