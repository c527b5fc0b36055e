use std::cmp::Ordering;
use std::sync::Arc;

use crate::common::{FolioError, PageId, RecordId, Result, PAGE_SIZE};
use crate::storage::disk::DiskManager;
use crate::tuple::AttrType;

use super::btree_page::{BTreeNodeRef, IndexEntry};
use super::key_comparator::KeyComparator;

/// One end of a key range.
#[derive(Debug, Clone)]
pub struct ScanBound {
    pub key: Vec<u8>,
    pub inclusive: bool,
}

/// Forward-only range scan over the leaf chain.
///
/// One leaf is buffered at a time; the next leaf is read only once the
/// current one is exhausted. Leaves emptied by deletes are skipped.
pub struct BTreeIterator {
    disk: Arc<DiskManager>,
    key_type: AttrType,
    low: Option<ScanBound>,
    high: Option<ScanBound>,
    entries: Vec<IndexEntry>,
    position: usize,
    next_page_id: Option<PageId>,
    done: bool,
}

impl BTreeIterator {
    pub(crate) fn new(
        disk: Arc<DiskManager>,
        key_type: AttrType,
        start_leaf: Option<PageId>,
        low: Option<ScanBound>,
        high: Option<ScanBound>,
    ) -> Self {
        Self {
            disk,
            key_type,
            low,
            high,
            entries: Vec::new(),
            position: 0,
            next_page_id: start_leaf,
            done: start_leaf.is_none(),
        }
    }

    fn below_low(&self, key: &[u8]) -> bool {
        match &self.low {
            None => false,
            Some(bound) => match self.key_type.compare(key, &bound.key) {
                Ordering::Less => true,
                Ordering::Equal => !bound.inclusive,
                Ordering::Greater => false,
            },
        }
    }

    fn above_high(&self, key: &[u8]) -> bool {
        match &self.high {
            None => false,
            Some(bound) => match self.key_type.compare(key, &bound.key) {
                Ordering::Greater => true,
                Ordering::Equal => !bound.inclusive,
                Ordering::Less => false,
            },
        }
    }

    fn load_leaf(&mut self, page_id: PageId) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        self.disk.read_page(page_id, &mut data)?;
        let node = BTreeNodeRef::new(page_id, &data, self.key_type);
        if !node.is_leaf() {
            return Err(FolioError::Corrupted {
                page_id,
                reason: "sibling chain reached an internal node".into(),
            });
        }

        self.entries = node.entries()?;
        self.position = 0;
        self.next_page_id = node.next_page_id();
        Ok(())
    }

    /// Returns the next `(key, rid)` in range. `Ok(None)` marks the end of the scan.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        while !self.done {
            if self.position < self.entries.len() {
                let entry = &self.entries[self.position];
                self.position += 1;

                if self.below_low(&entry.key) {
                    continue;
                }
                if self.above_high(&entry.key) {
                    self.done = true;
                    break;
                }
                return Ok(Some((entry.key.clone(), entry.rid)));
            }

            match self.next_page_id {
                Some(page_id) => self.load_leaf(page_id)?,
                None => self.done = true,
            }
        }

        self.entries.clear();
        Ok(None)
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
