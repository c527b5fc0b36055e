use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use super::data_type::VARCHAR_LEN_SIZE;
use super::AttrType;

/// Represents a typed value that can be stored in a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,

    /// 32-bit signed integer
    Int(i32),

    /// 32-bit floating point
    Float(f32),

    /// Variable-length string
    VarChar(String),
}

impl Value {
    /// Returns the AttrType matching this value, None for Null.
    pub fn attr_type(&self) -> Option<AttrType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(AttrType::Int),
            Value::Float(_) => Some(AttrType::Float),
            Value::VarChar(_) => Some(AttrType::VarChar),
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Serializes a non-null value according to the given type.
    /// Returns None if the value is null or incompatible with the type.
    pub fn serialize(&self, attr_type: AttrType) -> Option<Vec<u8>> {
        let mut bytes = Vec::new();
        match (self, attr_type) {
            (Value::Int(v), AttrType::Int) => bytes.put_i32_le(*v),
            (Value::Float(v), AttrType::Float) => bytes.put_f32_le(*v),
            (Value::VarChar(s), AttrType::VarChar) => {
                bytes.put_u32_le(s.len() as u32);
                bytes.put_slice(s.as_bytes());
            }
            _ => return None,
        }
        Some(bytes)
    }

    /// Deserializes a value from the front of `data` according to the given type.
    /// Returns the value and number of bytes consumed.
    pub fn deserialize(data: &[u8], attr_type: AttrType) -> Option<(Self, usize)> {
        let size = attr_type.encoded_len(data)?;
        let mut buf = &data[..size];
        let value = match attr_type {
            AttrType::Int => Value::Int(buf.get_i32_le()),
            AttrType::Float => Value::Float(buf.get_f32_le()),
            AttrType::VarChar => {
                buf.advance(VARCHAR_LEN_SIZE);
                Value::VarChar(String::from_utf8_lossy(buf).into_owned())
            }
        };
        Some((value, size))
    }
}

/// Compares two encoded values of the same type.
///
/// Floats use the IEEE total order so that every pair of keys is ordered;
/// strings compare bytewise.
pub fn compare_encoded(attr_type: AttrType, a: &[u8], b: &[u8]) -> Option<Ordering> {
    let a_len = attr_type.encoded_len(a)?;
    let b_len = attr_type.encoded_len(b)?;
    let (mut a, mut b) = (&a[..a_len], &b[..b_len]);

    let ordering = match attr_type {
        AttrType::Int => a.get_i32_le().cmp(&b.get_i32_le()),
        AttrType::Float => a.get_f32_le().total_cmp(&b.get_f32_le()),
        AttrType::VarChar => a[VARCHAR_LEN_SIZE..].cmp(&b[VARCHAR_LEN_SIZE..]),
    };
    Some(ordering)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::VarChar(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::VarChar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::VarChar(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
