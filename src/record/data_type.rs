use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};

use crate::common::codec::{get_u16, get_u8};
use crate::common::TabulaError;

/// Represents the attribute types supported by the database.
/// Every type occupies a fixed, declared number of bytes inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer: 4 bytes, little-endian
    Integer,

    /// 64-bit floating point: 8 bytes, IEEE 754
    Double,

    /// Boolean type: 1 byte (0 = false, 1 = true)
    Boolean,

    /// Fixed-length character string: exactly n bytes, space-padded
    Char(u16),

    /// Variable-length character string of up to n bytes.
    /// Stored as: length (2 bytes) + n reserved bytes
    VarChar(u16),
}

impl DataType {
    /// Returns the declared size in bytes of a value of this type.
    pub fn size(&self) -> usize {
        match self {
            DataType::Integer => 4,
            DataType::Double => 8,
            DataType::Boolean => 1,
            DataType::Char(n) => *n as usize,
            // 2 bytes for length prefix + max data length
            DataType::VarChar(n) => 2 + *n as usize,
        }
    }

    /// Returns true for the two character types.
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Char(_) | DataType::VarChar(_))
    }

    /// Returns the type ID used for serialization in the catalog.
    pub fn type_id(&self) -> u8 {
        match self {
            DataType::Integer => 0,
            DataType::Double => 1,
            DataType::Boolean => 2,
            DataType::Char(_) => 3,
            DataType::VarChar(_) => 4,
        }
    }

    /// Serializes the DataType for catalog storage.
    /// Format: type_id (1 byte) + optional length (2 bytes for Char/VarChar)
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.type_id());
        if let DataType::Char(n) | DataType::VarChar(n) = self {
            buf.put_u16_le(*n);
        }
    }

    /// Deserializes a DataType written by [`DataType::encode`].
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        match get_u8(buf)? {
            0 => Some(DataType::Integer),
            1 => Some(DataType::Double),
            2 => Some(DataType::Boolean),
            3 => Some(DataType::Char(get_u16(buf)?)),
            4 => Some(DataType::VarChar(get_u16(buf)?)),
            _ => None,
        }
    }
}

impl FromStr for DataType {
    type Err = TabulaError;

    /// Parses a type name such as `integer`, `double`, `boolean`, `char(8)`
    /// or `varchar(32)`. Names are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "integer" | "int" => return Ok(DataType::Integer),
            "double" => return Ok(DataType::Double),
            "boolean" | "bool" => return Ok(DataType::Boolean),
            _ => {}
        }

        let invalid = || TabulaError::InvalidType(s.trim().to_string());
        let (base, rest) = name.split_once('(').ok_or_else(invalid)?;
        let len = rest
            .strip_suffix(')')
            .and_then(|n| n.trim().parse::<u16>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(invalid)?;

        match base.trim() {
            "char" => Ok(DataType::Char(len)),
            "varchar" => Ok(DataType::VarChar(len)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}
