use std::fmt;

/// Attribute types understood by the record store and the index.
///
/// `Int` and `Float` occupy 4 bytes, little-endian. `VarChar` is stored as a
/// 4-byte length followed by that many bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    /// 32-bit signed integer
    Int,

    /// 32-bit floating point, IEEE 754
    Float,

    /// Variable-length character string
    VarChar,
}

/// Size of the length prefix in front of variable-length values
pub const VARCHAR_LEN_SIZE: usize = 4;

impl AttrType {
    /// Returns true if this type has a fixed size in bytes.
    pub fn is_fixed_size(&self) -> bool {
        !matches!(self, AttrType::VarChar)
    }

    /// Returns the fixed size in bytes, or None for variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            AttrType::Int | AttrType::Float => Some(4),
            AttrType::VarChar => None,
        }
    }

    /// Returns the encoded length of the value at the front of `data`,
    /// length prefix included, or None if `data` is too short.
    pub fn encoded_len(&self, data: &[u8]) -> Option<usize> {
        match self.fixed_size() {
            Some(size) => (data.len() >= size).then_some(size),
            None => {
                let prefix = data.get(..VARCHAR_LEN_SIZE)?;
                let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
                let total = VARCHAR_LEN_SIZE.checked_add(len)?;
                (data.len() >= total).then_some(total)
            }
        }
    }

    /// Returns the type tag used when persisting the type.
    pub fn type_id(&self) -> u8 {
        match self {
            AttrType::Int => 0,
            AttrType::Float => 1,
            AttrType::VarChar => 2,
        }
    }

    /// Inverse of [`AttrType::type_id`].
    pub fn from_type_id(type_id: u8) -> Option<Self> {
        match type_id {
            0 => Some(AttrType::Int),
            1 => Some(AttrType::Float),
            2 => Some(AttrType::VarChar),
            _ => None,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Int => write!(f, "INT"),
            AttrType::Float => write!(f, "FLOAT"),
            AttrType::VarChar => write!(f, "VARCHAR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_types() {
        assert!(AttrType::Int.is_fixed_size());
        assert!(AttrType::Float.is_fixed_size());
        assert!(!AttrType::VarChar.is_fixed_size());
        assert_eq!(AttrType::Int.fixed_size(), Some(4));
        assert_eq!(AttrType::VarChar.fixed_size(), None);
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(AttrType::Int.encoded_len(&[1, 0, 0, 0, 9]), Some(4));
        assert_eq!(AttrType::Float.encoded_len(&[1, 0]), None);

        let mut varchar = 3u32.to_le_bytes().to_vec();
        varchar.extend_from_slice(b"abc");
        assert_eq!(AttrType::VarChar.encoded_len(&varchar), Some(7));
        assert_eq!(AttrType::VarChar.encoded_len(&varchar[..6]), None);
    }

    #[test]
    fn test_type_id() {
        for t in [AttrType::Int, AttrType::Float, AttrType::VarChar] {
            assert_eq!(AttrType::from_type_id(t.type_id()), Some(t));
        }
        assert_eq!(AttrType::from_type_id(9), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(AttrType::Int.to_string(), "INT");
        assert_eq!(AttrType::VarChar.to_string(), "VARCHAR");
    }
}
