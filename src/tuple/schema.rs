use crate::common::{FolioError, Result};

use super::AttrType;

/// Describes one attribute of a relation: its name, type, and declared
/// maximum length in bytes (4 for fixed-size types).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    attr_type: AttrType,
    length: u32,
}

impl Attribute {
    /// Creates a new attribute definition.
    pub fn new(name: impl Into<String>, attr_type: AttrType, length: u32) -> Self {
        Self {
            name: name.into(),
            attr_type,
            length,
        }
    }

    /// Shorthand for a 4-byte integer attribute.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Int, 4)
    }

    /// Shorthand for a 4-byte float attribute.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Float, 4)
    }

    /// Shorthand for a variable-length string attribute of at most `max_len` bytes.
    pub fn varchar(name: impl Into<String>, max_len: u32) -> Self {
        Self::new(name, AttrType::VarChar, max_len)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    /// Returns the declared maximum length in bytes.
    pub fn length(&self) -> u32 {
        self.length
    }
}

/// Number of bytes in the null bitmap for `count` attributes.
pub fn null_bitmap_size(count: usize) -> usize {
    (count + 7) / 8
}

/// Returns the position of the attribute called `name`.
pub fn attribute_index(attrs: &[Attribute], name: &str) -> Result<usize> {
    attrs
        .iter()
        .position(|a| a.name() == name)
        .ok_or_else(|| FolioError::AttributeNotFound(name.to_string()))
}

/// Resolves a list of attribute names to positions, in the given order.
pub fn projection_indices(attrs: &[Attribute], names: &[&str]) -> Result<Vec<usize>> {
    names.iter().map(|name| attribute_index(attrs, name)).collect()
}
