use thiserror::Error;

use super::types::{PageId, RecordId};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File {0} already exists")]
    FileAlreadyExists(String),

    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Record {0} not found")]
    RecordNotFound(RecordId),

    #[error("Attribute {0} not found")]
    AttributeNotFound(String),

    #[error("Page {page_id} out of range (file has {page_count} pages)")]
    PageOutOfRange { page_id: PageId, page_count: u32 },

    #[error("Index entry not found for {0}")]
    IndexEntryNotFound(RecordId),

    #[error("Record of {size} bytes exceeds page capacity of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("Key of {size} bytes exceeds maximum key size of {max} bytes")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key type mismatch: index holds {expected} keys, got {actual}")]
    KeyTypeMismatch { expected: String, actual: String },

    #[error("Corrupted page {page_id}: {reason}")]
    Corrupted { page_id: PageId, reason: String },
}

pub type Result<T> = std::result::Result<T, FolioError>;
