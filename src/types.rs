use std::fmt;

use rusqlite::types::{Value, ValueRef};
use serde::{Deserialize, Serialize};

/// Opaque identifier of an open connection. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(i64);

/// Opaque identifier of a prepared statement; numbered independently of connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatementId(i64);

macro_rules! handle_id {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_id!(ConnectionId);
handle_id!(StatementId);

/// Open-mode flags accepted by [`crate::HandleRegistry::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ_WRITE: OpenFlags = OpenFlags(0);
    pub const CREATE_IF_NECESSARY: OpenFlags = OpenFlags(0x1000_0000);

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        OpenFlags(self.0 | rhs.0)
    }
}

/// A single SQL value, as bound to a statement or read back from a row.
///
/// ```rust
/// use sqlite_bridge::SqlValue;
///
/// let row = vec![SqlValue::Integer(1), SqlValue::Text("x".into()), SqlValue::Null];
/// assert!(row[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let SqlValue::Integer(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Type bit used when inferring a column's type across rows. NULL contributes nothing.
    #[must_use]
    pub(crate) fn type_bit(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Integer(_) => ColumnType::INTEGER_BIT,
            SqlValue::Real(_) => ColumnType::DOUBLE_BIT,
            SqlValue::Text(_) => ColumnType::STRING_BIT,
            SqlValue::Blob(_) => ColumnType::BYTEARRAY_BIT,
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(f) => Value::Real(f),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Blob(b),
        }
    }
}

/// Per-column type code of a fully materialized result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Null,
    Long,
    Double,
    String,
    ByteArray,
    /// Values of more than one storage class; consumers must inspect each cell.
    Object,
}

impl ColumnType {
    pub(crate) const INTEGER_BIT: u8 = 1;
    pub(crate) const DOUBLE_BIT: u8 = 2;
    pub(crate) const STRING_BIT: u8 = 4;
    pub(crate) const BYTEARRAY_BIT: u8 = 8;

    #[must_use]
    pub(crate) fn from_mask(mask: u8) -> Self {
        match mask {
            0 => ColumnType::Null,
            Self::INTEGER_BIT => ColumnType::Long,
            Self::DOUBLE_BIT => ColumnType::Double,
            Self::STRING_BIT => ColumnType::String,
            Self::BYTEARRAY_BIT => ColumnType::ByteArray,
            _ => ColumnType::Object,
        }
    }

    /// Single-character wire code.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            ColumnType::Null => 'n',
            ColumnType::Long => 'l',
            ColumnType::Double => 'd',
            ColumnType::String => 's',
            ColumnType::ByteArray => 'b',
            ColumnType::Object => 'o',
        }
    }
}
