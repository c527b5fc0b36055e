use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use log::{debug, trace};

use crate::common::{
    FolioError, PageId, RecordId, Result, INVALID_PAGE_ID, PAGE_SIZE, SPLIT_THRESHOLD,
};
use crate::storage::disk::DiskManager;
use crate::tuple::{AttrType, Value};

use super::btree_iterator::{BTreeIterator, ScanBound};
use super::btree_page::{entry_size, BTreeNode, BTreeNodeRef, ChildEntry, IndexEntry};
use super::key_comparator::{validate_key, validate_key_encoding, KeyComparator};

/// Page 0 of an index file: root page (u32, INVALID_PAGE_ID when empty)
/// followed by the key type tag (u8).
const METADATA_PAGE_ID: PageId = PageId(0);

/// Result of inserting into a subtree.
enum InsertOutcome {
    NoSplit,
    /// The subtree's root split; the separator and new right sibling must be
    /// added to the parent.
    Split(ChildEntry),
}

/// First index `i` such that the entries from `i` on total less than
/// `SPLIT_THRESHOLD` bytes.
fn split_point(sizes: &[usize]) -> usize {
    let mut right: usize = sizes.iter().sum();
    for (i, size) in sizes.iter().enumerate() {
        if right < SPLIT_THRESHOLD {
            return i;
        }
        right -= size;
    }
    sizes.len()
}

/// Disk-resident B+ tree over a single attribute, mapping `(key, rid)`
/// entries in sorted order. Duplicate keys are allowed and ordered by RID.
pub struct BTreeIndex {
    disk: Arc<DiskManager>,
    key_type: AttrType,
    root_page_id: Option<PageId>,
}

impl BTreeIndex {
    /// Creates an empty index file for keys of type `key_type`.
    pub fn create<P: AsRef<Path>>(path: P, key_type: AttrType) -> Result<()> {
        let path = path.as_ref();
        DiskManager::create(path)?;
        let disk = DiskManager::open(path)?;

        let mut data = [0u8; PAGE_SIZE];
        Self::write_metadata(&mut data, None, key_type);
        disk.append_page(&data)?;
        disk.close()
    }

    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        DiskManager::destroy(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(Arc::new(DiskManager::open(path)?))
    }

    /// Loads an index from an already open file.
    pub fn new(disk: Arc<DiskManager>) -> Result<Self> {
        if disk.page_count() == 0 {
            return Err(FolioError::Corrupted {
                page_id: METADATA_PAGE_ID,
                reason: "index file has no metadata page".into(),
            });
        }

        let mut data = [0u8; PAGE_SIZE];
        disk.read_page(METADATA_PAGE_ID, &mut data)?;
        let mut buf = &data[..];
        let root = buf.get_u32_le();
        let type_id = buf.get_u8();
        let key_type = AttrType::from_type_id(type_id).ok_or_else(|| FolioError::Corrupted {
            page_id: METADATA_PAGE_ID,
            reason: format!("unknown key type {}", type_id),
        })?;

        let root_page_id = (root != INVALID_PAGE_ID.as_u32()).then(|| PageId::new(root));
        Ok(Self {
            disk,
            key_type,
            root_page_id,
        })
    }

    fn write_metadata(data: &mut [u8], root: Option<PageId>, key_type: AttrType) {
        data.fill(0);
        let mut buf = &mut data[..];
        buf.put_u32_le(root.unwrap_or(INVALID_PAGE_ID).as_u32());
        buf.put_u8(key_type.type_id());
    }

    pub fn key_type(&self) -> AttrType {
        self.key_type
    }

    /// Current root page, None until the first insert.
    pub fn root_page_id(&self) -> Option<PageId> {
        self.root_page_id
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Encodes a typed value as a key of this index.
    pub fn encode_key(&self, value: &Value) -> Result<Vec<u8>> {
        let actual = value
            .attr_type()
            .ok_or_else(|| FolioError::InvalidKey("NULL cannot be indexed".into()))?;
        if actual != self.key_type {
            return Err(FolioError::KeyTypeMismatch {
                expected: self.key_type.to_string(),
                actual: actual.to_string(),
            });
        }
        let key = value
            .serialize(self.key_type)
            .ok_or_else(|| FolioError::InvalidKey(format!("cannot encode {}", value)))?;
        validate_key(self.key_type, &key)?;
        Ok(key)
    }

    fn set_root(&mut self, root: PageId) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        Self::write_metadata(&mut data, Some(root), self.key_type);
        self.disk.write_page(METADATA_PAGE_ID, &data)?;
        self.root_page_id = Some(root);
        debug!("index {} root is now {}", self.disk.path(), root);
        Ok(())
    }

    /// Formats a fresh page with `build` and appends it to the file.
    fn append_node(&self, build: impl FnOnce(&mut BTreeNode<'_>) -> Result<()>) -> Result<PageId> {
        let mut data = [0u8; PAGE_SIZE];
        let expected = PageId::new(self.disk.page_count());
        build(&mut BTreeNode::new(expected, &mut data, self.key_type))?;
        self.disk.append_page(&data)
    }

    /// Inserts the entry `(key, rid)`.
    pub fn insert(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        validate_key(self.key_type, key)?;
        let entry = IndexEntry::new(key, rid);

        let Some(root) = self.root_page_id else {
            let leaf = self.append_node(|node| node.write_leaf(std::slice::from_ref(&entry), None))?;
            return self.set_root(leaf);
        };

        if let InsertOutcome::Split(separator) = self.insert_into(root, &entry)? {
            let new_root = self.append_node(|node| {
                node.write_internal(root, std::slice::from_ref(&separator))
            })?;
            self.set_root(new_root)?;
        }
        Ok(())
    }

    fn insert_into(&self, page_id: PageId, entry: &IndexEntry) -> Result<InsertOutcome> {
        let mut data = [0u8; PAGE_SIZE];
        self.disk.read_page(page_id, &mut data)?;

        let mut node = BTreeNode::new(page_id, &mut data, self.key_type);
        if node.is_leaf() {
            if node.insert_entry(entry)? {
                self.disk.write_page(page_id, &data)?;
                return Ok(InsertOutcome::NoSplit);
            }
            return self.split_leaf(page_id, &data, entry);
        }

        let child = node.view().child_for(&entry.key, entry.rid)?;
        let separator = match self.insert_into(child, entry)? {
            InsertOutcome::NoSplit => return Ok(InsertOutcome::NoSplit),
            InsertOutcome::Split(separator) => separator,
        };

        let mut node = BTreeNode::new(page_id, &mut data, self.key_type);
        if node.insert_child_entry(&separator)? {
            self.disk.write_page(page_id, &data)?;
            return Ok(InsertOutcome::NoSplit);
        }
        self.split_internal(page_id, &data, separator)
    }

    /// Splits a full leaf around `entry`. The right sibling keeps a copy of
    /// the separator.
    fn split_leaf(&self, page_id: PageId, data: &[u8], entry: &IndexEntry) -> Result<InsertOutcome> {
        let node = BTreeNodeRef::new(page_id, data, self.key_type);
        let old_next = node.next_page_id();
        let mut entries = node.entries()?;

        let pos = entries
            .iter()
            .take_while(|e| self.key_type.compare_entry(e.as_pair(), entry.as_pair()) != Ordering::Greater)
            .count();
        entries.insert(pos, entry.clone());

        let sizes: Vec<usize> = entries.iter().map(|e| entry_size(e.key.len(), true)).collect();
        let split = split_point(&sizes).clamp(1, entries.len() - 1);
        let right_entries = entries.split_off(split);
        let separator = right_entries[0].clone();

        let right_page = self.append_node(|node| node.write_leaf(&right_entries, old_next))?;

        let mut left = [0u8; PAGE_SIZE];
        BTreeNode::new(page_id, &mut left, self.key_type).write_leaf(&entries, Some(right_page))?;
        self.disk.write_page(page_id, &left)?;

        debug!(
            "split leaf {}: {} entries stay, {} move to {}",
            page_id,
            entries.len(),
            right_entries.len(),
            right_page
        );
        Ok(InsertOutcome::Split(ChildEntry {
            separator,
            child: right_page,
        }))
    }

    /// Splits a full internal node around `new_entry`. The separator moves up
    /// and is kept in neither half.
    fn split_internal(&self, page_id: PageId, data: &[u8], new_entry: ChildEntry) -> Result<InsertOutcome> {
        let node = BTreeNodeRef::new(page_id, data, self.key_type);
        let leading_child = node.leading_child();
        let mut entries = node.child_entries()?;

        let pos = entries
            .iter()
            .take_while(|e| {
                self.key_type
                    .compare_entry(e.separator.as_pair(), new_entry.separator.as_pair())
                    != Ordering::Greater
            })
            .count();
        entries.insert(pos, new_entry);

        let sizes: Vec<usize> = entries
            .iter()
            .map(|e| entry_size(e.separator.key.len(), false))
            .collect();
        // Both halves keep at least one separator.
        let last_split = entries.len().saturating_sub(2).max(1);
        let split = split_point(&sizes).clamp(1, last_split);
        let mut right_entries = entries.split_off(split);
        let pushed = right_entries.remove(0);

        let right_page =
            self.append_node(|node| node.write_internal(pushed.child, &right_entries))?;

        let mut left = [0u8; PAGE_SIZE];
        BTreeNode::new(page_id, &mut left, self.key_type).write_internal(leading_child, &entries)?;
        self.disk.write_page(page_id, &left)?;

        debug!(
            "split internal node {}: {} keys stay, {} move to {}",
            page_id,
            entries.len(),
            right_entries.len(),
            right_page
        );
        Ok(InsertOutcome::Split(ChildEntry {
            separator: pushed.separator,
            child: right_page,
        }))
    }

    /// Removes the entry matching both `key` and `rid` from its leaf. Nodes are
    /// never merged or rebalanced, so a leaf may be left empty.
    pub fn delete(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        validate_key_encoding(self.key_type, key)?;
        let Some(mut page_id) = self.root_page_id else {
            return Err(FolioError::IndexEntryNotFound(rid));
        };

        let mut data = [0u8; PAGE_SIZE];
        loop {
            self.disk.read_page(page_id, &mut data)?;
            let node = BTreeNodeRef::new(page_id, &data, self.key_type);
            if node.is_leaf() {
                break;
            }
            page_id = node.child_for(key, rid)?;
        }

        let mut node = BTreeNode::new(page_id, &mut data, self.key_type);
        if !node.remove_entry(key, rid)? {
            return Err(FolioError::IndexEntryNotFound(rid));
        }
        self.disk.write_page(page_id, &data)?;
        trace!("deleted {} from leaf {}", rid, page_id);
        Ok(())
    }

    /// Starts a range scan. A missing bound leaves that side of the range open.
    pub fn scan(
        &self,
        low_key: Option<&[u8]>,
        high_key: Option<&[u8]>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Result<BTreeIterator> {
        for key in low_key.iter().chain(high_key.iter()) {
            validate_key_encoding(self.key_type, key)?;
        }

        let start_leaf = match self.root_page_id {
            None => None,
            Some(root) => Some(self.find_start_leaf(root, low_key, low_inclusive)?),
        };

        let bound = |key: Option<&[u8]>, inclusive| {
            key.map(|key| ScanBound {
                key: key.to_vec(),
                inclusive,
            })
        };
        Ok(BTreeIterator::new(
            Arc::clone(&self.disk),
            self.key_type,
            start_leaf,
            bound(low_key, low_inclusive),
            bound(high_key, high_inclusive),
        ))
    }

    fn find_start_leaf(&self, root: PageId, low_key: Option<&[u8]>, inclusive: bool) -> Result<PageId> {
        let mut page_id = root;
        let mut data = [0u8; PAGE_SIZE];
        loop {
            self.disk.read_page(page_id, &mut data)?;
            let node = BTreeNodeRef::new(page_id, &data, self.key_type);
            if node.is_leaf() {
                return Ok(page_id);
            }
            page_id = node.child_for_lower_bound(low_key, inclusive)?;
        }
    }

    fn format_key(&self, key: &[u8]) -> String {
        Value::deserialize(key, self.key_type)
            .map(|(value, _)| value.to_string())
            .unwrap_or_else(|| format!("{:?}", key))
    }

    /// Writes the tree in pre-order: every internal node lists its keys and
    /// then its children, every leaf lists each distinct key with its RIDs.
    pub fn print_tree<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.root_page_id {
            None => writeln!(out, "{{}}")?,
            Some(root) => {
                self.print_node(out, root, 0)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }

    fn print_node<W: Write>(&self, out: &mut W, page_id: PageId, indent: usize) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        self.disk.read_page(page_id, &mut data)?;
        let node = BTreeNodeRef::new(page_id, &data, self.key_type);
        let pad = " ".repeat(indent);

        if node.is_leaf() {
            let mut groups: Vec<(Vec<u8>, Vec<RecordId>)> = Vec::new();
            for entry in node.entries()? {
                let same_key = groups.last().map_or(false, |(key, _)| {
                    self.key_type.compare(key, &entry.key) == Ordering::Equal
                });
                match groups.last_mut() {
                    Some((_, rids)) if same_key => rids.push(entry.rid),
                    _ => groups.push((entry.key, vec![entry.rid])),
                }
            }
            let groups: Vec<String> = groups
                .iter()
                .map(|(key, rids)| {
                    let rids: Vec<String> = rids.iter().map(|rid| rid.to_string()).collect();
                    format!("\"{}:[{}]\"", self.format_key(key), rids.join(","))
                })
                .collect();
            write!(out, "{}{{\"keys\": [{}]}}", pad, groups.join(","))?;
            return Ok(());
        }

        let keys: Vec<String> = node
            .child_entries()?
            .iter()
            .map(|e| format!("\"{}\"", self.format_key(&e.separator.key)))
            .collect();
        let children = node.children()?;

        writeln!(out, "{}{{\"keys\": [{}],", pad, keys.join(","))?;
        writeln!(out, "{} \"children\": [", pad)?;
        for (i, child) in children.iter().enumerate() {
            self.print_node(out, *child, indent + 2)?;
            if i + 1 < children.len() {
                writeln!(out, ",")?;
            } else {
                writeln!(out)?;
            }
        }
        write!(out, "{}]}}", pad)?;
        Ok(())
    }

    /// Persists the file's counters and releases this handle.
    pub fn close(self) -> Result<()> {
        self.disk.persist_counters()
    }
}
