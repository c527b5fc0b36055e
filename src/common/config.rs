use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant, used for "no root" and "no sibling"
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Size of the hidden counter block at the front of every paged file
pub const COUNTER_BLOCK_SIZE: usize = PAGE_SIZE;

/// Size of a forwarding pointer stored in place of a relocated record:
/// page number (4 bytes) + slot number (2 bytes)
pub const FORWARD_POINTER_SIZE: usize = 6;

/// Byte threshold (ORDER) that places the split boundary of a B+ tree node.
/// The right sibling receives entries until its total drops below this.
pub const SPLIT_THRESHOLD: usize = PAGE_SIZE / 2;

/// Largest encoded key accepted by the index. Keeps every entry well under
/// a quarter page so that both halves of a split always fit.
pub const MAX_KEY_SIZE: usize = 512;
