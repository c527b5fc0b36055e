use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use crate::common::{FolioError, PageId, RecordId, Result, SlotId, PAGE_SIZE};
use crate::tuple::AttrType;

use super::key_comparator::KeyComparator;

/// B+ tree node layout:
///
/// +--------------------------------------------------------------+
/// | is_leaf: u8                                                  |
/// +--------------------------------------------------------------+
/// | leaf:     [key | rid] [key | rid] ...                         |
/// | internal: child0 [key | rid | child1] [key | rid | child2]...|
/// +--------------------------------------------------------------+
/// | Free Space                                                   |
/// +--------------------------------------------------------------+
/// | next_page: i32 (leaves only, -1 = rightmost leaf)            |
/// | num_keys: u16                                                |
/// | free_bytes: u16                                              |
/// +--------------------------------------------------------------+
///
/// Keys use the attribute encoding of the key type, a RID is page (u32) +
/// slot (u16), and a child pointer is a page number (u32). Entries are kept
/// sorted by `(key, rid)`.
const IS_LEAF_OFFSET: usize = 0;
const ENTRIES_OFFSET: usize = 1;

const NUM_KEYS_OFFSET: usize = PAGE_SIZE - 4;
const FREE_BYTES_OFFSET: usize = PAGE_SIZE - 2;
const NEXT_PAGE_OFFSET: usize = PAGE_SIZE - 8;

const INTERNAL_FOOTER_SIZE: usize = 4;
const LEAF_FOOTER_SIZE: usize = 8;

pub const RID_SIZE: usize = 6;
pub const CHILD_SIZE: usize = 4;

const NO_SIBLING: i32 = -1;

/// A `(key, rid)` pair as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub rid: RecordId,
}

impl IndexEntry {
    pub fn new(key: impl Into<Vec<u8>>, rid: RecordId) -> Self {
        Self {
            key: key.into(),
            rid,
        }
    }

    pub fn as_pair(&self) -> (&[u8], RecordId) {
        (&self.key, self.rid)
    }
}

/// An internal-node entry: a separator and the child to its right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub separator: IndexEntry,
    pub child: PageId,
}

/// Encoded size of an entry in a leaf (`is_leaf`) or internal node.
pub fn entry_size(key_len: usize, is_leaf: bool) -> usize {
    key_len + RID_SIZE + if is_leaf { 0 } else { CHILD_SIZE }
}

fn footer_size(is_leaf: bool) -> usize {
    if is_leaf {
        LEAF_FOOTER_SIZE
    } else {
        INTERNAL_FOOTER_SIZE
    }
}

/// Bytes available for entries (and the leading child) in an empty node.
pub fn node_capacity(is_leaf: bool) -> usize {
    PAGE_SIZE - footer_size(is_leaf) - ENTRIES_OFFSET
}

fn entries_start(is_leaf: bool) -> usize {
    ENTRIES_OFFSET + if is_leaf { 0 } else { CHILD_SIZE }
}

fn is_leaf_of(data: &[u8]) -> bool {
    data[IS_LEAF_OFFSET] == 1
}

fn num_keys_of(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[NUM_KEYS_OFFSET], data[NUM_KEYS_OFFSET + 1]])
}

fn free_bytes_of(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[FREE_BYTES_OFFSET], data[FREE_BYTES_OFFSET + 1]])
}

fn used_end_of(data: &[u8]) -> usize {
    let is_leaf = is_leaf_of(data);
    (PAGE_SIZE - footer_size(is_leaf)).saturating_sub(free_bytes_of(data) as usize)
}

fn read_page_id(mut bytes: &[u8]) -> PageId {
    PageId::new(bytes.get_u32_le())
}

fn read_rid(mut bytes: &[u8]) -> RecordId {
    let page = bytes.get_u32_le();
    let slot = bytes.get_u16_le();
    RecordId::new(PageId::new(page), SlotId::new(slot))
}

fn encode_entry(entry: &IndexEntry, child: Option<PageId>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(entry.key.len() + RID_SIZE + CHILD_SIZE);
    bytes.put_slice(&entry.key);
    bytes.put_u32_le(entry.rid.page_id.as_u32());
    bytes.put_u16_le(entry.rid.slot_id.as_u16());
    if let Some(child) = child {
        bytes.put_u32_le(child.as_u32());
    }
    bytes
}

/// Read-only view of a B+ tree node.
pub struct BTreeNodeRef<'a> {
    page_id: PageId,
    data: &'a [u8],
    key_type: AttrType,
}

impl<'a> BTreeNodeRef<'a> {
    pub fn new(page_id: PageId, data: &'a [u8], key_type: AttrType) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self {
            page_id,
            data,
            key_type,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn is_leaf(&self) -> bool {
        is_leaf_of(self.data)
    }

    pub fn num_keys(&self) -> u16 {
        num_keys_of(self.data)
    }

    pub fn free_bytes(&self) -> usize {
        free_bytes_of(self.data) as usize
    }

    /// Right sibling of a leaf.
    pub fn next_page_id(&self) -> Option<PageId> {
        let bytes = &self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4];
        let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        (value >= 0).then(|| PageId::new(value as u32))
    }

    fn corrupted(&self, reason: impl Into<String>) -> FolioError {
        FolioError::Corrupted {
            page_id: self.page_id,
            reason: reason.into(),
        }
    }

    /// Start offsets of every entry, followed by the end of the last one.
    fn entry_offsets(&self) -> Result<Vec<usize>> {
        let is_leaf = self.is_leaf();
        let end = used_end_of(self.data);
        let num_keys = self.num_keys() as usize;

        let mut offsets = Vec::with_capacity(num_keys + 1);
        let mut offset = entries_start(is_leaf);
        for i in 0..num_keys {
            offsets.push(offset);
            let key_len = self
                .data
                .get(offset..end)
                .and_then(|rest| self.key_type.key_len(rest))
                .ok_or_else(|| self.corrupted(format!("entry {} has a truncated key", i)))?;
            offset += entry_size(key_len, is_leaf);
        }
        if offset != end {
            return Err(self.corrupted(format!(
                "entries end at {} but free space starts at {}",
                offset, end
            )));
        }
        offsets.push(offset);
        Ok(offsets)
    }

    fn entry_at(&self, offset: usize, next: usize) -> IndexEntry {
        let child = if self.is_leaf() { 0 } else { CHILD_SIZE };
        let rid_offset = next - child - RID_SIZE;
        IndexEntry {
            key: self.data[offset..rid_offset].to_vec(),
            rid: read_rid(&self.data[rid_offset..]),
        }
    }

    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        let offsets = self.entry_offsets()?;
        Ok(offsets
            .windows(2)
            .map(|w| self.entry_at(w[0], w[1]))
            .collect())
    }

    /// Leftmost child of an internal node.
    pub fn leading_child(&self) -> PageId {
        read_page_id(&self.data[ENTRIES_OFFSET..])
    }

    pub fn child_entries(&self) -> Result<Vec<ChildEntry>> {
        if self.is_leaf() {
            return Err(self.corrupted("leaf has no children"));
        }
        let offsets = self.entry_offsets()?;
        Ok(offsets
            .windows(2)
            .map(|w| ChildEntry {
                separator: self.entry_at(w[0], w[1]),
                child: read_page_id(&self.data[w[1] - CHILD_SIZE..]),
            })
            .collect())
    }

    /// All children of an internal node, leftmost first.
    pub fn children(&self) -> Result<Vec<PageId>> {
        let mut children = vec![self.leading_child()];
        children.extend(self.child_entries()?.into_iter().map(|e| e.child));
        Ok(children)
    }

    /// Child whose range holds `(key, rid)`; equal separators route right.
    pub fn child_for(&self, key: &[u8], rid: RecordId) -> Result<PageId> {
        let entries = self.child_entries()?;
        let index = entries
            .iter()
            .take_while(|e| {
                self.key_type.compare_entry(e.separator.as_pair(), (key, rid)) != Ordering::Greater
            })
            .count();
        Ok(if index == 0 {
            self.leading_child()
        } else {
            entries[index - 1].child
        })
    }

    /// Child holding the first entry that satisfies a scan's lower bound.
    pub fn child_for_lower_bound(&self, low: Option<&[u8]>, inclusive: bool) -> Result<PageId> {
        let Some(low) = low else {
            return Ok(self.leading_child());
        };
        let entries = self.child_entries()?;
        let index = entries
            .iter()
            .take_while(|e| match self.key_type.compare(&e.separator.key, low) {
                Ordering::Less => true,
                Ordering::Equal => !inclusive,
                Ordering::Greater => false,
            })
            .count();
        Ok(if index == 0 {
            self.leading_child()
        } else {
            entries[index - 1].child
        })
    }
}

/// Mutable view of a B+ tree node.
pub struct BTreeNode<'a> {
    page_id: PageId,
    data: &'a mut [u8],
    key_type: AttrType,
}

impl<'a> BTreeNode<'a> {
    pub fn new(page_id: PageId, data: &'a mut [u8], key_type: AttrType) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self {
            page_id,
            data,
            key_type,
        }
    }

    pub fn view(&self) -> BTreeNodeRef<'_> {
        BTreeNodeRef::new(self.page_id, &*self.data, self.key_type)
    }

    pub fn is_leaf(&self) -> bool {
        is_leaf_of(self.data)
    }

    pub fn num_keys(&self) -> u16 {
        num_keys_of(self.data)
    }

    pub fn free_bytes(&self) -> usize {
        free_bytes_of(self.data) as usize
    }

    fn set_num_keys(&mut self, num_keys: u16) {
        self.data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 2].copy_from_slice(&num_keys.to_le_bytes());
    }

    fn set_free_bytes(&mut self, free: usize) {
        self.data[FREE_BYTES_OFFSET..FREE_BYTES_OFFSET + 2]
            .copy_from_slice(&(free as u16).to_le_bytes());
    }

    /// Formats the page as an empty leaf.
    pub fn init_leaf(&mut self, next: Option<PageId>) {
        self.data.fill(0);
        self.data[IS_LEAF_OFFSET] = 1;
        self.set_num_keys(0);
        self.set_free_bytes(node_capacity(true));
        self.set_next_page_id(next);
    }

    /// Formats the page as an internal node with a single child.
    pub fn init_internal(&mut self, leading_child: PageId) {
        self.data.fill(0);
        self.data[IS_LEAF_OFFSET] = 0;
        self.data[ENTRIES_OFFSET..ENTRIES_OFFSET + CHILD_SIZE]
            .copy_from_slice(&leading_child.as_u32().to_le_bytes());
        self.set_num_keys(0);
        self.set_free_bytes(node_capacity(false) - CHILD_SIZE);
    }

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        let value = next.map(|p| p.as_u32() as i32).unwrap_or(NO_SIBLING);
        self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Inserts encoded entry bytes in `(key, rid)` order, after any equal
    /// entry. Returns false, leaving the node untouched, when it does not fit.
    fn insert_sorted(&mut self, entry: &IndexEntry, bytes: &[u8]) -> Result<bool> {
        if bytes.len() > self.free_bytes() {
            return Ok(false);
        }

        let (pos, end) = {
            let node = self.view();
            let offsets = node.entry_offsets()?;
            let entries = node.entries()?;
            let index = entries
                .iter()
                .take_while(|e| {
                    self.key_type.compare_entry(e.as_pair(), entry.as_pair()) != Ordering::Greater
                })
                .count();
            (offsets[index], offsets[offsets.len() - 1])
        };

        self.data.copy_within(pos..end, pos + bytes.len());
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
        self.set_num_keys(self.num_keys() + 1);
        self.set_free_bytes(self.free_bytes() - bytes.len());
        Ok(true)
    }

    /// Inserts a leaf entry. Returns false when the leaf is full.
    pub fn insert_entry(&mut self, entry: &IndexEntry) -> Result<bool> {
        debug_assert!(self.is_leaf());
        self.insert_sorted(entry, &encode_entry(entry, None))
    }

    /// Inserts a separator and its right child. Returns false when the node is full.
    pub fn insert_child_entry(&mut self, entry: &ChildEntry) -> Result<bool> {
        debug_assert!(!self.is_leaf());
        self.insert_sorted(&entry.separator, &encode_entry(&entry.separator, Some(entry.child)))
    }

    /// Removes the leaf entry matching both `key` and `rid`. Returns false
    /// when no such entry exists.
    pub fn remove_entry(&mut self, key: &[u8], rid: RecordId) -> Result<bool> {
        let (start, next, end) = {
            let node = self.view();
            let offsets = node.entry_offsets()?;
            let entries = node.entries()?;
            let Some(index) = entries.iter().position(|e| {
                e.rid == rid && self.key_type.compare(&e.key, key) == Ordering::Equal
            }) else {
                return Ok(false);
            };
            (offsets[index], offsets[index + 1], offsets[offsets.len() - 1])
        };

        let size = next - start;
        self.data.copy_within(next..end, start);
        self.data[end - size..end].fill(0);
        self.set_num_keys(self.num_keys() - 1);
        self.set_free_bytes(self.free_bytes() + size);
        Ok(true)
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.free_bytes() {
            return Err(FolioError::Corrupted {
                page_id: self.page_id,
                reason: "entries overflow the node".into(),
            });
        }
        let end = used_end_of(self.data);
        self.data[end..end + bytes.len()].copy_from_slice(bytes);
        self.set_num_keys(self.num_keys() + 1);
        self.set_free_bytes(self.free_bytes() - bytes.len());
        Ok(())
    }

    /// Rewrites the page as a leaf holding `entries`, already sorted.
    pub fn write_leaf(&mut self, entries: &[IndexEntry], next: Option<PageId>) -> Result<()> {
        self.init_leaf(next);
        for entry in entries {
            self.append_bytes(&encode_entry(entry, None))?;
        }
        Ok(())
    }

    /// Rewrites the page as an internal node, entries already sorted.
    pub fn write_internal(&mut self, leading_child: PageId, entries: &[ChildEntry]) -> Result<()> {
        self.init_internal(leading_child);
        for entry in entries {
            self.append_bytes(&encode_entry(&entry.separator, Some(entry.child)))?;
        }
        Ok(())
    }
}
