//! Dynamic SQL values decoded from result-set columns.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Text-protocol rows carry every column as a string; the protocol engine
/// turns each cell into one of these based on the column's declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// DECIMAL / NUMERIC digits exactly as the server sent them, and
    /// BIGINT UNSIGNED values beyond `i64::MAX`
    Decimal(String),
    /// Character data; DATE, TIME and DATETIME columns also land here
    Text(String),
    /// BLOB, BINARY and BIT columns
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// MySQL column type family this variant corresponds to.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "VARCHAR",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
        }
    }

    /// Any integer variant as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::TinyInt(v) => v.into(),
            Value::SmallInt(v) => v.into(),
            Value::Int(v) => v.into(),
            Value::BigInt(v) => v,
            _ => return None,
        })
    }

    /// Numeric variants (including decimal text) as `f64`. Lossy for
    /// large BIGINT and high-precision DECIMAL values.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::BigInt(v) => Some(*v as f64),
            Value::Decimal(digits) => digits.parse().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of a `Bytes` or `Text` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert a `u64` to `Value` without losing magnitude.
    ///
    /// Values up to `i64::MAX` become `BigInt`; anything larger is kept as a
    /// `Decimal` string, since BIGINT UNSIGNED can exceed the signed range.
    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        if let Ok(signed) = i64::try_from(v) {
            Value::BigInt(signed)
        } else {
            tracing::trace!(value = v, "u64 exceeds i64::MAX; keeping as decimal text");
            Value::Decimal(v.to_string())
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(via $wide:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant($(<$wide>::from)?(v))
                }
            }
        )*
    };
}

// Unsigned types widen into the next signed variant.
value_from! {
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => SmallInt via i16,
    u16 => Int via i32,
    u32 => BigInt via i64,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
