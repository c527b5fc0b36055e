use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};

use crate::common::{FolioError, PageId, RecordId, Result, PAGE_SIZE};
use crate::storage::disk::DiskManager;
use crate::storage::page::{RecordPage, RecordPageRef, SlotState, FOOTER_SIZE, SLOT_SIZE};
use crate::tuple::{attribute_index, projection_indices, Attribute};

use super::predicate::{CompOp, ScanCondition};
use super::record_format::{
    decode_record, encode_record, read_record_attribute, record_home, with_home,
};
use super::scan::RecordScan;

/// Largest record body a single empty page can hold.
const MAX_RECORD_SIZE: usize = PAGE_SIZE - FOOTER_SIZE - SLOT_SIZE;

/// Where a RID currently resolves to.
struct Resolved {
    /// Every slot visited, starting with the caller's RID; the last one is live.
    chain: Vec<RecordId>,
    /// Contents of the page holding the live record.
    page: [u8; PAGE_SIZE],
}

impl Resolved {
    fn location(&self) -> RecordId {
        self.chain[self.chain.len() - 1]
    }

    fn record(&self) -> Result<&[u8]> {
        let location = self.location();
        RecordPageRef::new(location.page_id, &self.page).record(location.slot_id)
    }
}

/// Slotted-page record store over a single paged file.
///
/// Tuples go in and come out in the flat null-bitmap format; on the page they
/// are kept as record bodies with an attribute offset directory. A RID stays
/// valid for the lifetime of the record, even after an update moves it to
/// another page.
pub struct RecordStore {
    disk: Arc<DiskManager>,
}

impl RecordStore {
    /// Creates an empty record file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<()> {
        DiskManager::create(path)
    }

    /// Removes a record file.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        DiskManager::destroy(path)
    }

    /// Opens an existing record file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(DiskManager::open(path)?)))
    }

    /// Wraps an already open paged file.
    pub fn new(disk: Arc<DiskManager>) -> Self {
        Self { disk }
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Inserts a flat tuple and returns its RID.
    pub fn insert(&self, attrs: &[Attribute], tuple: &[u8]) -> Result<RecordId> {
        let record = encode_record(attrs, tuple)?;
        self.insert_record(&record)
    }

    /// Places an encoded record: the last page first, then the first earlier
    /// page with room, then a freshly appended page.
    fn insert_record(&self, record: &[u8]) -> Result<RecordId> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(FolioError::RecordTooLarge {
                size: record.len(),
                capacity: MAX_RECORD_SIZE,
            });
        }

        let page_count = self.disk.page_count();
        let mut data = [0u8; PAGE_SIZE];

        if page_count > 0 {
            let last = page_count - 1;
            let candidates = std::iter::once(last).chain(0..last);
            for page_num in candidates {
                let page_id = PageId::new(page_num);
                self.disk.read_page(page_id, &mut data)?;
                let mut page = RecordPage::new(page_id, &mut data);
                if page.can_insert(record.len()) {
                    let slot_id = page.insert_record(record)?;
                    self.disk.write_page(page_id, &data)?;
                    return Ok(RecordId::new(page_id, slot_id));
                }
            }
        }

        let mut page = RecordPage::new(PageId::new(page_count), &mut data);
        page.init();
        let slot_id = page.insert_record(record)?;
        let page_id = self.disk.append_page(&data)?;
        debug!("record file {} grew to {} pages", self.disk.path(), page_id.as_u32() + 1);
        Ok(RecordId::new(page_id, slot_id))
    }

    /// Follows forwarding pointers from `rid` to the live record.
    ///
    /// Only a record's home RID resolves: the resident slot of a moved record
    /// and the slots of intermediate forwarding stubs read as not found.
    fn resolve(&self, rid: RecordId) -> Result<Resolved> {
        let mut chain = vec![rid];
        let mut visited = HashSet::new();
        let mut page = [0u8; PAGE_SIZE];
        let mut current = rid;

        loop {
            if !visited.insert(current) {
                return Err(FolioError::Corrupted {
                    page_id: current.page_id,
                    reason: format!("forwarding cycle through {} starting at {}", current, rid),
                });
            }

            match self.disk.read_page(current.page_id, &mut page) {
                Ok(()) => {}
                Err(FolioError::PageOutOfRange { .. }) if current == rid => {
                    return Err(FolioError::RecordNotFound(rid))
                }
                Err(e) => return Err(e),
            }

            match RecordPageRef::new(current.page_id, &page).slot(current.slot_id)? {
                Some(SlotState::Live { .. }) => {
                    let resolved = Resolved { chain, page };
                    let moved = resolved.chain.len() > 1;
                    return match record_home(resolved.record()?)? {
                        Some(home) if home != rid => Err(FolioError::RecordNotFound(rid)),
                        Some(_) if moved => Ok(resolved),
                        None if !moved => Ok(resolved),
                        _ => Err(FolioError::Corrupted {
                            page_id: current.page_id,
                            reason: format!(
                                "{} does not belong to the forwarding chain from {}",
                                current, rid
                            ),
                        }),
                    };
                }
                Some(SlotState::Forwarded { target, .. }) => {
                    trace!("{} forwards to {}", current, target);
                    chain.push(target);
                    current = target;
                }
                Some(SlotState::Tombstone) | None => return Err(FolioError::RecordNotFound(rid)),
            }
        }
    }

    /// Reads the tuple stored under `rid`.
    pub fn read(&self, attrs: &[Attribute], rid: RecordId) -> Result<Vec<u8>> {
        let resolved = self.resolve(rid)?;
        decode_record(attrs, resolved.record()?)
    }

    /// Replaces the tuple stored under `rid`. The RID stays valid: when the
    /// new tuple no longer fits on its page, the record is moved and the old
    /// slot becomes a forwarding pointer.
    pub fn update(&self, attrs: &[Attribute], rid: RecordId, tuple: &[u8]) -> Result<()> {
        let mut resolved = self.resolve(rid)?;
        let location = resolved.location();
        let mut record = encode_record(attrs, tuple)?;
        // Anything stored away from the home slot remembers where it belongs.
        if location != rid {
            record = with_home(&record, rid)?;
        }

        let mut page = RecordPage::new(location.page_id, &mut resolved.page);
        if page.can_update(location.slot_id, record.len())? {
            page.update_record(location.slot_id, &record)?;
            self.disk.write_page(location.page_id, &resolved.page)?;
            return Ok(());
        }

        let new_location = self.insert_record(&with_home(&record, rid)?)?;
        debug!("relocated record {} from {} to {}", rid, location, new_location);

        let mut data = [0u8; PAGE_SIZE];
        self.disk.read_page(location.page_id, &mut data)?;
        RecordPage::new(location.page_id, &mut data).set_forward(location.slot_id, new_location)?;
        self.disk.write_page(location.page_id, &data)
    }

    /// Deletes the record under `rid`, reclaiming its bytes and those of
    /// every forwarding pointer leading to it.
    pub fn delete(&self, rid: RecordId) -> Result<()> {
        let resolved = self.resolve(rid)?;

        let mut data = [0u8; PAGE_SIZE];
        for hop in resolved.chain.iter().rev() {
            self.disk.read_page(hop.page_id, &mut data)?;
            RecordPage::new(hop.page_id, &mut data).delete_record(hop.slot_id)?;
            self.disk.write_page(hop.page_id, &data)?;
        }
        Ok(())
    }

    /// Reads one attribute without decoding the rest of the record. Returns a
    /// one-byte null bitmap followed by the value (absent when null).
    pub fn read_attribute(&self, attrs: &[Attribute], rid: RecordId, name: &str) -> Result<Vec<u8>> {
        let index = attribute_index(attrs, name)?;
        let resolved = self.resolve(rid)?;
        read_record_attribute(attrs, resolved.record()?, index)
    }

    /// Starts a scan over every live record, in `(page, slot)` order.
    ///
    /// Records that match `condition` (all records when None) come back
    /// projected onto the `projection` attributes, in the order given.
    pub fn scan(
        &self,
        attrs: &[Attribute],
        condition: Option<ScanCondition>,
        projection: &[&str],
    ) -> Result<RecordScan> {
        let projection = projection_indices(attrs, projection)?;

        let condition = match condition {
            Some(condition) => {
                let index = attribute_index(attrs, &condition.attribute)?;
                let attr_type = attrs[index].attr_type();
                if condition.op != CompOp::NoOp
                    && attr_type.encoded_len(&condition.value) != Some(condition.value.len())
                {
                    return Err(FolioError::InvalidTuple(format!(
                        "comparison value is not a single {} value",
                        attr_type
                    )));
                }
                Some((index, condition.op, condition.value))
            }
            None => None,
        };

        Ok(RecordScan::new(
            Arc::clone(&self.disk),
            attrs.to_vec(),
            condition,
            projection,
        ))
    }

    /// Persists the file's counters and releases this handle.
    pub fn close(self) -> Result<()> {
        self.disk.persist_counters()
    }

    #[cfg(test)]
    fn live_records_on(&self, page_id: PageId) -> Result<usize> {
        let mut data = [0u8; PAGE_SIZE];
        self.disk.read_page(page_id, &mut data)?;
        Ok(RecordPageRef::new(page_id, &data).record_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlotId;
    use crate::tuple::{decode_tuple, TupleBuilder, Value};
    use tempfile::tempdir;

    fn create_store(dir: &tempfile::TempDir) -> RecordStore {
        let path = dir.path().join("records");
        RecordStore::create(&path).unwrap();
        RecordStore::open(&path).unwrap()
    }

    fn attrs() -> Vec<Attribute> {
        vec![Attribute::int("id"), Attribute::varchar("payload", 8000)]
    }

    fn tuple(attrs: &[Attribute], id: i32, payload_len: usize) -> Vec<u8> {
        TupleBuilder::new(attrs)
            .value(id)
            .value("x".repeat(payload_len))
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_read() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let t = tuple(&attrs, 1, 10);
        let rid = store.insert(&attrs, &t).unwrap();
        assert_eq!(rid, RecordId::new(PageId::new(0), SlotId::new(0)));
        assert_eq!(store.read(&attrs, rid).unwrap(), t);
    }

    #[test]
    fn test_placement_prefers_last_page_then_first_fit() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        // Two records of ~1.9K fill a page; the third lands on page 1.
        let big = tuple(&attrs, 0, 1900);
        let a = store.insert(&attrs, &big).unwrap();
        let b = store.insert(&attrs, &big).unwrap();
        let c = store.insert(&attrs, &big).unwrap();
        assert_eq!(a.page_id, PageId::new(0));
        assert_eq!(b.page_id, PageId::new(0));
        assert_eq!(c.page_id, PageId::new(1));

        // Fill most of page 1; small records still prefer it.
        let c2 = store.insert(&attrs, &tuple(&attrs, 1, 1100)).unwrap();
        assert_eq!(c2.page_id, PageId::new(1));
        let d = store.insert(&attrs, &tuple(&attrs, 2, 10)).unwrap();
        assert_eq!(d.page_id, PageId::new(1));

        // Page 1 is too full for another big record, so the freed space on
        // page 0 is used and the tombstoned slot comes back.
        store.delete(a).unwrap();
        let e = store.insert(&attrs, &big).unwrap();
        assert_eq!(e, a);
        assert_eq!(store.disk().page_count(), 2);
    }

    #[test]
    fn test_record_too_large() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let result = store.insert(&attrs, &tuple(&attrs, 0, 4100));
        assert!(matches!(result, Err(FolioError::RecordTooLarge { .. })));
        assert_eq!(store.disk().page_count(), 0);
    }

    #[test]
    fn test_update_forwards_and_deletes_chain() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let rid = store.insert(&attrs, &tuple(&attrs, 1, 100)).unwrap();
        store.insert(&attrs, &tuple(&attrs, 2, 1900)).unwrap();
        store.insert(&attrs, &tuple(&attrs, 3, 1900)).unwrap();

        // Cannot grow in place on page 0 any more.
        let grown = tuple(&attrs, 1, 1000);
        store.update(&attrs, rid, &grown).unwrap();
        assert_eq!(store.read(&attrs, rid).unwrap(), grown);

        let resolved = store.resolve(rid).unwrap();
        assert_eq!(resolved.chain.len(), 2);
        assert_ne!(resolved.location().page_id, rid.page_id);

        store.delete(rid).unwrap();
        assert!(matches!(
            store.read(&attrs, rid),
            Err(FolioError::RecordNotFound(_))
        ));
        assert!(matches!(
            store.delete(rid),
            Err(FolioError::RecordNotFound(_))
        ));
        assert_eq!(store.live_records_on(PageId::new(0)).unwrap(), 2);
    }

    #[test]
    fn test_multi_hop_forwarding() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let rid = store.insert(&attrs, &tuple(&attrs, 1, 100)).unwrap();
        store.insert(&attrs, &tuple(&attrs, 2, 1900)).unwrap();
        store.insert(&attrs, &tuple(&attrs, 3, 1900)).unwrap();

        // First move: page 0 is full, so the record lands on a new page 1.
        store.update(&attrs, rid, &tuple(&attrs, 1, 1000)).unwrap();
        store.insert(&attrs, &tuple(&attrs, 4, 1400)).unwrap();
        store.insert(&attrs, &tuple(&attrs, 5, 1400)).unwrap();

        // Second move: page 1 cannot absorb the growth either.
        let latest = tuple(&attrs, 1, 2000);
        store.update(&attrs, rid, &latest).unwrap();

        let resolved = store.resolve(rid).unwrap();
        assert_eq!(resolved.chain.len(), 3);
        assert_eq!(resolved.location().page_id, PageId::new(2));
        assert_eq!(store.read(&attrs, rid).unwrap(), latest);

        // Shrinking in place at the far end keeps the chain intact.
        let shrunk = tuple(&attrs, 1, 10);
        store.update(&attrs, rid, &shrunk).unwrap();
        assert_eq!(store.resolve(rid).unwrap().chain.len(), 3);
        assert_eq!(store.read(&attrs, rid).unwrap(), shrunk);

        // Neither the intermediate stub nor the resident slot is an address.
        for hop in &resolved.chain[1..] {
            assert!(matches!(
                store.read(&attrs, *hop),
                Err(FolioError::RecordNotFound(_))
            ));
        }

        store.delete(rid).unwrap();
        assert_eq!(store.live_records_on(PageId::new(0)).unwrap(), 2);
        assert_eq!(store.live_records_on(PageId::new(1)).unwrap(), 2);
        assert_eq!(store.live_records_on(PageId::new(2)).unwrap(), 0);
    }

    #[test]
    fn test_bad_forwarding_is_corruption() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let a = store.insert(&attrs, &tuple(&attrs, 1, 10)).unwrap();
        let b = store.insert(&attrs, &tuple(&attrs, 2, 10)).unwrap();
        let c = store.insert(&attrs, &tuple(&attrs, 3, 10)).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        store.disk().read_page(a.page_id, &mut data).unwrap();
        {
            let mut page = RecordPage::new(a.page_id, &mut data);
            page.set_forward(a.slot_id, b).unwrap();
            page.set_forward(b.slot_id, a).unwrap();
        }
        store.disk().write_page(a.page_id, &data).unwrap();

        assert!(matches!(
            store.read(&attrs, a),
            Err(FolioError::Corrupted { .. })
        ));
        assert!(matches!(store.delete(b), Err(FolioError::Corrupted { .. })));

        // A stub leading to a record that was never moved there.
        store.disk().read_page(a.page_id, &mut data).unwrap();
        RecordPage::new(a.page_id, &mut data).set_forward(a.slot_id, c).unwrap();
        store.disk().write_page(a.page_id, &data).unwrap();
        assert!(matches!(
            store.read(&attrs, a),
            Err(FolioError::Corrupted { .. })
        ));
        assert_eq!(
            store.read(&attrs, c).unwrap(),
            tuple(&attrs, 3, 10)
        );
    }

    #[test]
    fn test_read_attribute() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let t = TupleBuilder::new(&attrs).value(9i32).null().build().unwrap();
        let rid = store.insert(&attrs, &t).unwrap();

        let id = store.read_attribute(&attrs, rid, "id").unwrap();
        assert_eq!(id, vec![0, 9, 0, 0, 0]);
        assert_eq!(store.read_attribute(&attrs, rid, "payload").unwrap(), vec![0x80]);
        assert!(matches!(
            store.read_attribute(&attrs, rid, "missing"),
            Err(FolioError::AttributeNotFound(_))
        ));

        let values = decode_tuple(&attrs, &store.read(&attrs, rid).unwrap()).unwrap();
        assert_eq!(values, vec![Value::Int(9), Value::Null]);
    }

    #[test]
    fn test_invalid_rid() {
        let dir = tempdir().unwrap();
        let store = create_store(&dir);
        let attrs = attrs();

        let missing_page = RecordId::new(PageId::new(5), SlotId::new(0));
        assert!(matches!(
            store.read(&attrs, missing_page),
            Err(FolioError::RecordNotFound(_))
        ));

        let rid = store.insert(&attrs, &tuple(&attrs, 1, 1)).unwrap();
        let missing_slot = RecordId::new(rid.page_id, SlotId::new(9));
        assert!(matches!(
            store.read(&attrs, missing_slot),
            Err(FolioError::RecordNotFound(_))
        ));
    }
}
