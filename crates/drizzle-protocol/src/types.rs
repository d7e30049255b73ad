//! Column types and text-protocol value decoding.
//!
//! Every value in a text-protocol row arrives as a string. The column's
//! declared [`FieldType`] and its UNSIGNED flag decide which
//! [`Value`] variant the string becomes; anything that fails to parse is
//! kept as text rather than dropped.

use drizzle_core::Value;

macro_rules! field_types {
    ($($(#[$doc:meta])* $variant:ident = $code:literal => $sql:literal,)*) => {
        /// Field type codes carried by column definitions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum FieldType {
            $($(#[$doc])* $variant = $code,)*
        }

        impl FieldType {
            /// Map a wire type code; unknown codes decode as strings.
            #[must_use]
            pub fn from_u8(code: u8) -> Self {
                match code {
                    $($code => FieldType::$variant,)*
                    other => {
                        tracing::trace!(code = other, "Unknown field type, decoding as string");
                        FieldType::String
                    }
                }
            }

            /// SQL name of the type.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(FieldType::$variant => $sql,)*
                }
            }
        }
    };
}

field_types! {
    Decimal = 0x00 => "DECIMAL",
    /// TINYINT
    Tiny = 0x01 => "TINYINT",
    /// SMALLINT
    Short = 0x02 => "SMALLINT",
    /// INT
    Long = 0x03 => "INT",
    Float = 0x04 => "FLOAT",
    Double = 0x05 => "DOUBLE",
    Null = 0x06 => "NULL",
    Timestamp = 0x07 => "TIMESTAMP",
    /// BIGINT
    LongLong = 0x08 => "BIGINT",
    /// MEDIUMINT
    Int24 = 0x09 => "MEDIUMINT",
    Date = 0x0A => "DATE",
    Time = 0x0B => "TIME",
    DateTime = 0x0C => "DATETIME",
    Year = 0x0D => "YEAR",
    NewDate = 0x0E => "DATE",
    VarChar = 0x0F => "VARCHAR",
    Bit = 0x10 => "BIT",
    Timestamp2 = 0x11 => "TIMESTAMP",
    DateTime2 = 0x12 => "DATETIME",
    Time2 = 0x13 => "TIME",
    Json = 0xF5 => "JSON",
    NewDecimal = 0xF6 => "DECIMAL",
    Enum = 0xF7 => "ENUM",
    Set = 0xF8 => "SET",
    TinyBlob = 0xF9 => "TINYBLOB",
    MediumBlob = 0xFA => "MEDIUMBLOB",
    LongBlob = 0xFB => "LONGBLOB",
    Blob = 0xFC => "BLOB",
    VarString = 0xFD => "VARCHAR",
    /// CHAR
    String = 0xFE => "CHAR",
    Geometry = 0xFF => "GEOMETRY",
}

impl FieldType {
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Tiny
                | FieldType::Short
                | FieldType::Long
                | FieldType::LongLong
                | FieldType::Int24
                | FieldType::Year
        )
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, FieldType::Float | FieldType::Double)
    }

    #[must_use]
    pub const fn is_decimal(self) -> bool {
        matches!(self, FieldType::Decimal | FieldType::NewDecimal)
    }

    #[must_use]
    pub const fn is_blob(self) -> bool {
        matches!(
            self,
            FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::Geometry
        )
    }

    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Date
                | FieldType::Time
                | FieldType::DateTime
                | FieldType::Timestamp
                | FieldType::NewDate
                | FieldType::Timestamp2
                | FieldType::DateTime2
                | FieldType::Time2
        )
    }
}

bitflags::bitflags! {
    /// Column definition flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnFlags: u16 {
        const NOT_NULL = 1;
        const PRIMARY_KEY = 1 << 1;
        const UNIQUE_KEY = 1 << 2;
        const MULTIPLE_KEY = 1 << 3;
        const BLOB = 1 << 4;
        const UNSIGNED = 1 << 5;
        const ZEROFILL = 1 << 6;
        const BINARY = 1 << 7;
        const ENUM = 1 << 8;
        const AUTO_INCREMENT = 1 << 9;
        const TIMESTAMP = 1 << 10;
        const SET = 1 << 11;
        const NO_DEFAULT_VALUE = 1 << 12;
        const ON_UPDATE_NOW = 1 << 13;
        const NUM = 1 << 15;
    }
}

/// One column of a tabular result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Catalog name (always "def")
    pub catalog: String,
    pub schema: String,
    /// Table name or alias
    pub table: String,
    pub org_table: String,
    /// Column name or alias
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    /// Maximum display length
    pub column_length: u32,
    pub column_type: FieldType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl ColumnDescriptor {
    #[must_use]
    pub const fn is_not_null(&self) -> bool {
        self.flags.contains(ColumnFlags::NOT_NULL)
    }

    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.flags.contains(ColumnFlags::PRIMARY_KEY)
    }

    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }

    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        self.flags.contains(ColumnFlags::AUTO_INCREMENT)
    }

    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.flags.contains(ColumnFlags::BINARY)
    }

    /// Decode one non-NULL text value of this column.
    pub fn decode(&self, data: &[u8]) -> Value {
        decode_text_value(self.column_type, data, self.is_unsigned())
    }
}

/// Decode a text-protocol value.
///
/// Unsigned integers widen to the next signed variant so no value wraps;
/// BIGINT UNSIGNED beyond `i64::MAX` becomes a decimal string.
pub fn decode_text_value(field_type: FieldType, data: &[u8], is_unsigned: bool) -> Value {
    let text = String::from_utf8_lossy(data);
    let as_text = || Value::Text(text.to_string());

    match field_type {
        FieldType::Tiny if is_unsigned => text
            .parse::<u8>()
            .map_or_else(|_| as_text(), |v| Value::SmallInt(i16::from(v))),
        FieldType::Tiny => text.parse::<i8>().map_or_else(|_| as_text(), Value::TinyInt),

        FieldType::Short if is_unsigned => text
            .parse::<u16>()
            .map_or_else(|_| as_text(), |v| Value::Int(i32::from(v))),
        FieldType::Short | FieldType::Year => {
            text.parse::<i16>().map_or_else(|_| as_text(), Value::SmallInt)
        }

        FieldType::Long if is_unsigned => text
            .parse::<u32>()
            .map_or_else(|_| as_text(), |v| Value::BigInt(i64::from(v))),
        // MEDIUMINT UNSIGNED tops out at 2^24-1.
        FieldType::Long | FieldType::Int24 => {
            text.parse::<i32>().map_or_else(|_| as_text(), Value::Int)
        }

        FieldType::LongLong if is_unsigned => {
            text.parse::<u64>().map_or_else(|_| as_text(), Value::from_u64)
        }
        FieldType::LongLong => text.parse::<i64>().map_or_else(|_| as_text(), Value::BigInt),

        FieldType::Float => text.parse::<f32>().map_or_else(|_| as_text(), Value::Float),
        FieldType::Double => text.parse::<f64>().map_or_else(|_| as_text(), Value::Double),

        // Kept as a string to preserve precision.
        FieldType::Decimal | FieldType::NewDecimal => Value::Decimal(text.to_string()),

        FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob
        | FieldType::Geometry
        | FieldType::Bit => Value::Bytes(data.to_vec()),

        FieldType::Json => serde_json::from_str(&text).map_or_else(|_| as_text(), Value::Json),

        FieldType::Null => Value::Null,

        // Strings, enums, sets, dates and times.
        _ => as_text(),
    }
}
