//! Core types for drizzle-rs.
//!
//! This crate provides the pieces shared by the protocol engine and the
//! layers built on top of it:
//!
//! - `Error` taxonomy covering transport, protocol, auth and server errors
//! - `Value` for dynamically-typed column values
//! - `Row` and `ColumnInfo` for tabular results

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, ProtocolError, ProtocolErrorKind,
    Result, ServerError, ServerErrorKind,
};
pub use row::{ColumnInfo, Row};
pub use value::Value;
