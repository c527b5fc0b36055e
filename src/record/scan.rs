use std::sync::Arc;

use crate::common::{PageId, RecordId, Result, SlotId, PAGE_SIZE};
use crate::storage::disk::DiskManager;
use crate::storage::page::{RecordPageRef, SlotState};
use crate::tuple::Attribute;

use super::predicate::CompOp;
use super::record_format::{project_record, record_field, record_home};

/// Lazy scan over a record file, in `(page, slot)` order.
///
/// Forwarding stubs are skipped: a relocated record is produced once, when
/// the scan reaches its resident slot, but under its home RID. RIDs therefore
/// ascend except where a moved record appears. Pages are read one at a time, so records inserted or
/// moved while the scan is open may or may not be observed.
pub struct RecordScan {
    disk: Arc<DiskManager>,
    attrs: Vec<Attribute>,
    condition: Option<(usize, CompOp, Vec<u8>)>,
    projection: Vec<usize>,
    page: Box<[u8; PAGE_SIZE]>,
    /// Page held in `page`, if any.
    loaded_page: Option<PageId>,
    current_page: u32,
    current_slot: u16,
}

impl RecordScan {
    pub(crate) fn new(
        disk: Arc<DiskManager>,
        attrs: Vec<Attribute>,
        condition: Option<(usize, CompOp, Vec<u8>)>,
        projection: Vec<usize>,
    ) -> Self {
        Self {
            disk,
            attrs,
            condition,
            projection,
            page: Box::new([0u8; PAGE_SIZE]),
            loaded_page: None,
            current_page: 0,
            current_slot: 0,
        }
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) {
        self.loaded_page = None;
        self.current_page = 0;
        self.current_slot = 0;
    }

    fn matches(&self, record: &[u8]) -> Result<bool> {
        match &self.condition {
            None => Ok(true),
            Some((index, op, value)) => {
                let field = record_field(&self.attrs, record, *index)?;
                Ok(op.evaluate(self.attrs[*index].attr_type(), field, value))
            }
        }
    }

    /// Returns the next matching record and its RID, projected onto the
    /// requested attributes. `Ok(None)` marks the end of the scan.
    pub fn next(&mut self) -> Result<Option<(RecordId, Vec<u8>)>> {
        while self.current_page < self.disk.page_count() {
            let page_id = PageId::new(self.current_page);
            if self.loaded_page != Some(page_id) {
                self.disk.read_page(page_id, &mut self.page[..])?;
                self.loaded_page = Some(page_id);
            }

            let page = RecordPageRef::new(page_id, &self.page[..]);
            while self.current_slot < page.num_slots() {
                let slot_id = SlotId::new(self.current_slot);
                self.current_slot += 1;

                if !matches!(page.slot(slot_id)?, Some(SlotState::Live { .. })) {
                    continue;
                }
                let record = page.record(slot_id)?;
                if self.matches(record)? {
                    let tuple = project_record(&self.attrs, record, &self.projection)?;
                    let rid = record_home(record)?.unwrap_or(RecordId::new(page_id, slot_id));
                    return Ok(Some((rid, tuple)));
                }
            }

            self.current_page += 1;
            self.current_slot = 0;
        }

        Ok(None)
    }
}

impl Iterator for RecordScan {
    type Item = Result<(RecordId, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match RecordScan::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
