use std::cmp::Ordering;

use crate::common::{FolioError, RecordId, Result, MAX_KEY_SIZE};
use crate::tuple::{compare_encoded, AttrType};

/// Length and ordering of encoded index keys.
pub trait KeyComparator: Send + Sync {
    /// Length of the key at the front of `data`, None if it is truncated.
    fn key_len(&self, data: &[u8]) -> Option<usize>;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Orders `(key, rid)` pairs: by key, then by RID.
    fn compare_entry(&self, a: (&[u8], RecordId), b: (&[u8], RecordId)) -> Ordering {
        self.compare(a.0, b.0).then_with(|| a.1.cmp(&b.1))
    }
}

impl KeyComparator for AttrType {
    fn key_len(&self, data: &[u8]) -> Option<usize> {
        self.encoded_len(data)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        // Stored keys are validated on insert; raw bytes only order garbage.
        compare_encoded(*self, a, b).unwrap_or_else(|| a.cmp(b))
    }
}

/// Checks that `key` is exactly one well-formed key of type `key_type`.
pub fn validate_key_encoding(key_type: AttrType, key: &[u8]) -> Result<()> {
    match key_type.key_len(key) {
        Some(len) if len == key.len() => Ok(()),
        _ => Err(FolioError::InvalidKey(format!(
            "{} bytes do not encode one {} key",
            key.len(),
            key_type
        ))),
    }
}

/// Checks that `key` is well formed and small enough to store in a node.
pub fn validate_key(key_type: AttrType, key: &[u8]) -> Result<()> {
    validate_key_encoding(key_type, key)?;
    if key.len() > MAX_KEY_SIZE {
        return Err(FolioError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}
