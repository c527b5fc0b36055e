//! Flat tuple helpers.
//!
//! ## Flat Tuple Format
//!
//! This is the format callers hand to the record store and receive back:
//!
//! ```text
//! +----------------+------------------------------------------+
//! | Null Bitmap    | Non-null fields, in attribute order      |
//! | (N bytes)      | int/float: 4 bytes, varchar: u32 len+data |
//! +----------------+------------------------------------------+
//! ```
//!
//! The bitmap holds one bit per attribute, most significant bit first within
//! each byte; a set bit means the attribute is NULL and has no field bytes.

use std::fmt::Write;

use crate::common::{FolioError, Result};

use super::schema::null_bitmap_size;
use super::{Attribute, Value};

/// Returns whether attribute `index` is marked null in `bitmap`.
pub fn is_null(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .map(|byte| byte & (0x80 >> (index % 8)) != 0)
        .unwrap_or(false)
}

/// Marks attribute `index` as null in `bitmap`.
pub fn set_null(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 0x80 >> (index % 8);
}

/// Splits a flat tuple into per-attribute encoded fields (None for null).
pub fn split_tuple<'t>(attrs: &[Attribute], data: &'t [u8]) -> Result<Vec<Option<&'t [u8]>>> {
    let bitmap_size = null_bitmap_size(attrs.len());
    let bitmap = data
        .get(..bitmap_size)
        .ok_or_else(|| FolioError::InvalidTuple("tuple shorter than its null bitmap".into()))?;

    let mut offset = bitmap_size;
    let mut fields = Vec::with_capacity(attrs.len());
    for (i, attr) in attrs.iter().enumerate() {
        if is_null(bitmap, i) {
            fields.push(None);
            continue;
        }
        let size = attr.attr_type().encoded_len(&data[offset..]).ok_or_else(|| {
            FolioError::InvalidTuple(format!("attribute {} is truncated", attr.name()))
        })?;
        fields.push(Some(&data[offset..offset + size]));
        offset += size;
    }

    Ok(fields)
}

/// Builds a flat tuple from per-attribute encoded fields.
pub fn join_fields(fields: &[Option<&[u8]>]) -> Vec<u8> {
    let mut bytes = vec![0u8; null_bitmap_size(fields.len())];
    for (i, field) in fields.iter().enumerate() {
        match field {
            Some(field) => bytes.extend_from_slice(field),
            None => set_null(&mut bytes, i),
        }
    }
    bytes
}

/// Encodes typed values into the flat tuple format.
pub fn encode_tuple(attrs: &[Attribute], values: &[Value]) -> Result<Vec<u8>> {
    if values.len() != attrs.len() {
        return Err(FolioError::InvalidTuple(format!(
            "{} values for {} attributes",
            values.len(),
            attrs.len()
        )));
    }

    let mut encoded = Vec::with_capacity(values.len());
    for (attr, value) in attrs.iter().zip(values) {
        if value.is_null() {
            encoded.push(None);
            continue;
        }
        if let Value::VarChar(s) = value {
            if s.len() > attr.length() as usize {
                return Err(FolioError::InvalidTuple(format!(
                    "{} bytes exceed the declared length {} of {}",
                    s.len(),
                    attr.length(),
                    attr.name()
                )));
            }
        }
        let bytes = value.serialize(attr.attr_type()).ok_or_else(|| {
            FolioError::InvalidTuple(format!("{:?} is not a {} value", value, attr.attr_type()))
        })?;
        encoded.push(Some(bytes));
    }

    let fields: Vec<Option<&[u8]>> = encoded.iter().map(|f| f.as_deref()).collect();
    Ok(join_fields(&fields))
}

/// Decodes a flat tuple into typed values.
pub fn decode_tuple(attrs: &[Attribute], data: &[u8]) -> Result<Vec<Value>> {
    split_tuple(attrs, data)?
        .into_iter()
        .zip(attrs)
        .map(|(field, attr)| match field {
            None => Ok(Value::Null),
            Some(bytes) => Value::deserialize(bytes, attr.attr_type())
                .map(|(value, _)| value)
                .ok_or_else(|| FolioError::InvalidTuple(format!("bad {} field", attr.name()))),
        })
        .collect()
}

/// Renders a flat tuple as `name: value` pairs, for diagnostics.
pub fn format_tuple(attrs: &[Attribute], data: &[u8]) -> Result<String> {
    let values = decode_tuple(attrs, data)?;
    let mut out = String::new();
    for (i, (attr, value)) in attrs.iter().zip(values).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}: {}", attr.name(), value);
    }
    Ok(out)
}

/// Builder for constructing flat tuples fluently.
pub struct TupleBuilder<'a> {
    attrs: &'a [Attribute],
    values: Vec<Value>,
    current_index: usize,
}

impl<'a> TupleBuilder<'a> {
    /// Creates a new tuple builder for the given attributes, all initially null.
    pub fn new(attrs: &'a [Attribute]) -> Self {
        Self {
            attrs,
            values: vec![Value::Null; attrs.len()],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = value.into();
            self.current_index += 1;
        }
        self
    }

    /// Sets a null value at the current position and advances.
    pub fn null(self) -> Self {
        self.value(Value::Null)
    }

    /// Sets the value for a specific attribute by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.attrs.iter().position(|a| a.name() == name) {
            self.values[index] = value.into();
        }
        self
    }

    /// Encodes the tuple.
    pub fn build(self) -> Result<Vec<u8>> {
        encode_tuple(self.attrs, &self.values)
    }
}
