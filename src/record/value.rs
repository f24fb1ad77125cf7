use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::codec::{get_f64, get_i32, get_str, get_u8, put_str};

use super::DataType;

/// Represents a typed value that can be stored in a record.
/// Each variant corresponds to a DataType and holds the actual data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,

    /// 32-bit signed integer
    Integer(i32),

    /// 64-bit floating point
    Double(f64),

    /// Boolean value
    Boolean(bool),

    /// String value (used for both Char and VarChar)
    String(String),
}

const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_BOOLEAN: u8 = 3;
const TAG_STRING: u8 = 4;

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short lowercase name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
        }
    }

    /// Attempts to convert this value into one storable as `target`.
    /// Integers widen to doubles; strings must fit the declared length.
    /// Returns None if the cast is not possible.
    pub fn cast(&self, target: &DataType) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Integer(v), DataType::Integer) => Some(Value::Integer(*v)),
            (Value::Integer(v), DataType::Double) => Some(Value::Double(*v as f64)),
            (Value::Double(v), DataType::Double) => Some(Value::Double(*v)),
            (Value::Boolean(b), DataType::Boolean) => Some(Value::Boolean(*b)),
            (Value::String(s), DataType::Char(n)) => {
                // Padding is not part of a fixed-length value
                let s = unpad(s);
                (s.len() <= *n as usize).then(|| Value::String(s.to_string()))
            }
            (Value::String(s), DataType::VarChar(n)) => {
                (s.len() <= *n as usize).then(|| Value::String(s.clone()))
            }
            _ => None,
        }
    }

    /// Writes this value as a slot of exactly `data_type.size()` bytes.
    /// Null values write a zeroed slot; the record's null bitmap carries
    /// the null flag. The value must already be cast to `data_type`.
    pub(crate) fn write_slot(&self, data_type: &DataType, buf: &mut Vec<u8>) {
        let start = buf.len();
        match (self, data_type) {
            (Value::Integer(v), DataType::Integer) => buf.put_i32_le(*v),
            (Value::Double(v), DataType::Double) => buf.put_f64_le(*v),
            (Value::Boolean(b), DataType::Boolean) => buf.put_u8(u8::from(*b)),
            (Value::String(s), DataType::Char(n)) => {
                // Pad with spaces to fixed length
                let bytes = s.as_bytes();
                let len = bytes.len().min(*n as usize);
                buf.put_slice(&bytes[..len]);
                buf.put_bytes(b' ', *n as usize - len);
            }
            (Value::String(s), DataType::VarChar(n)) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(*n as usize);
                buf.put_u16_le(len as u16);
                buf.put_slice(&bytes[..len]);
            }
            _ => {}
        }
        let written = buf.len() - start;
        buf.put_bytes(0, data_type.size() - written);
    }

    /// Reads a slot written by [`Value::write_slot`].
    pub(crate) fn read_slot(data: &[u8], data_type: &DataType) -> Option<Value> {
        if data.len() < data_type.size() {
            return None;
        }
        let mut buf = data;
        match data_type {
            DataType::Integer => Some(Value::Integer(buf.get_i32_le())),
            DataType::Double => Some(Value::Double(buf.get_f64_le())),
            DataType::Boolean => Some(Value::Boolean(buf.get_u8() != 0)),
            DataType::Char(n) => {
                let s = std::str::from_utf8(&data[..*n as usize]).ok()?;
                Some(Value::String(unpad(s).to_string()))
            }
            DataType::VarChar(n) => {
                let len = buf.get_u16_le() as usize;
                if len > *n as usize {
                    return None;
                }
                let s = std::str::from_utf8(&data[2..2 + len]).ok()?;
                Some(Value::String(s.to_string()))
            }
        }
    }

    /// Writes the value with a leading type tag, independent of any schema.
    pub fn encode_tagged(&self, buf: &mut impl BufMut) {
        match self {
            Value::Null => buf.put_u8(TAG_NULL),
            Value::Integer(v) => {
                buf.put_u8(TAG_INTEGER);
                buf.put_i32_le(*v);
            }
            Value::Double(v) => {
                buf.put_u8(TAG_DOUBLE);
                buf.put_f64_le(*v);
            }
            Value::Boolean(b) => {
                buf.put_u8(TAG_BOOLEAN);
                buf.put_u8(u8::from(*b));
            }
            Value::String(s) => {
                buf.put_u8(TAG_STRING);
                put_str(buf, s);
            }
        }
    }

    /// Reads a value written by [`Value::encode_tagged`].
    pub fn decode_tagged(buf: &mut impl Buf) -> Option<Value> {
        match get_u8(buf)? {
            TAG_NULL => Some(Value::Null),
            TAG_INTEGER => get_i32(buf).map(Value::Integer),
            TAG_DOUBLE => get_f64(buf).map(Value::Double),
            TAG_BOOLEAN => get_u8(buf).map(|b| Value::Boolean(b != 0)),
            TAG_STRING => get_str(buf).map(Value::String),
            _ => None,
        }
    }

    /// Compares two values for ordering.
    /// Returns None if the values are not comparable (different types or null).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => Some(a.total_cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Double(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Double(a), Value::Integer(b)) => Some(a.total_cmp(&(*b as f64))),
            _ => None,
        }
    }

    /// Rank used to order values of different kinds against each other.
    pub(crate) fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Double(_) => 3,
            Value::String(_) => 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Strips the space padding of a fixed-length string.
pub(crate) fn unpad(s: &str) -> &str {
    s.trim_end_matches(' ')
}
