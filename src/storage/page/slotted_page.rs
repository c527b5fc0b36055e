use crate::common::{FolioError, PageId, RecordId, Result, SlotId, FORWARD_POINTER_SIZE, PAGE_SIZE};

/// Record page layout:
///
/// +------------------+
/// | Record Data      |  (grows upward from offset 0)
/// | [record 0]       |
/// | [record 1]       |
/// | ...              |
/// +------------------+
/// |                  |
/// | Free Space       |
/// |                  |
/// +------------------+
/// | Slot Directory   |  (grows downward toward the data)
/// | ...              |
/// | [slot 1]         |
/// | [slot 0]         |
/// +------------------+
/// | num_slots: u16   |
/// | free_bytes: u16  |
/// +------------------+
///
/// Each slot entry contains:
///   - offset: i16 (offset of the record from the start of the page, -1 = tombstone)
///   - length: i16 (length of the record, -1 = forwarding pointer)
///
/// The data region is always dense: deleting or resizing a record shifts the
/// bytes that follow it, so `free_bytes` is exactly the gap between the end of
/// the data and the start of the slot directory.
pub const FOOTER_SIZE: usize = 4;

/// Size of each slot entry in bytes
pub const SLOT_SIZE: usize = 4;

const NUM_SLOTS_OFFSET: usize = PAGE_SIZE - 4;
const FREE_BYTES_OFFSET: usize = PAGE_SIZE - 2;

const TOMBSTONE_OFFSET: i16 = -1;
const FORWARDED_LENGTH: i16 = -1;

/// Decoded state of a slot directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// A record resident on this page.
    Live { offset: usize, length: usize },
    /// A deleted slot, eligible for reuse.
    Tombstone,
    /// The record moved; the pointer bytes at `offset` name its new location.
    Forwarded { offset: usize, target: RecordId },
}

impl SlotState {
    /// Bytes this slot occupies in the data region.
    pub fn resident_len(&self) -> usize {
        match self {
            SlotState::Live { length, .. } => *length,
            SlotState::Forwarded { .. } => FORWARD_POINTER_SIZE,
            SlotState::Tombstone => 0,
        }
    }

    fn offset(&self) -> Option<usize> {
        match self {
            SlotState::Live { offset, .. } | SlotState::Forwarded { offset, .. } => Some(*offset),
            SlotState::Tombstone => None,
        }
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

fn slot_entry_offset(slot_num: u16) -> usize {
    PAGE_SIZE - FOOTER_SIZE - (slot_num as usize + 1) * SLOT_SIZE
}

fn num_slots_of(data: &[u8]) -> u16 {
    read_u16(data, NUM_SLOTS_OFFSET)
}

fn free_bytes_of(data: &[u8]) -> u16 {
    read_u16(data, FREE_BYTES_OFFSET)
}

/// End of the dense data region.
fn data_end_of(data: &[u8]) -> usize {
    (PAGE_SIZE - FOOTER_SIZE - num_slots_of(data) as usize * SLOT_SIZE)
        .saturating_sub(free_bytes_of(data) as usize)
}

fn corrupted(page_id: PageId, reason: String) -> FolioError {
    FolioError::Corrupted { page_id, reason }
}

fn slot_state_of(page_id: PageId, data: &[u8], slot_id: SlotId) -> Result<Option<SlotState>> {
    let slot_num = slot_id.as_u16();
    if slot_num >= num_slots_of(data) {
        return Ok(None);
    }

    let entry = slot_entry_offset(slot_num);
    let offset = read_i16(data, entry);
    let length = read_i16(data, entry + 2);

    if offset == TOMBSTONE_OFFSET {
        return Ok(Some(SlotState::Tombstone));
    }
    if offset < 0 {
        return Err(corrupted(page_id, format!("slot {} has offset {}", slot_num, offset)));
    }

    let offset = offset as usize;
    let resident = if length == FORWARDED_LENGTH {
        FORWARD_POINTER_SIZE
    } else if length < 0 {
        return Err(corrupted(page_id, format!("slot {} has length {}", slot_num, length)));
    } else {
        length as usize
    };

    if offset + resident > data_end_of(data) {
        return Err(corrupted(
            page_id,
            format!("slot {} points past the data region", slot_num),
        ));
    }

    if length == FORWARDED_LENGTH {
        let bytes = &data[offset..offset + FORWARD_POINTER_SIZE];
        let target_page = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let target_slot = u16::from_le_bytes([bytes[4], bytes[5]]);
        return Ok(Some(SlotState::Forwarded {
            offset,
            target: RecordId::new(PageId::new(target_page), SlotId::new(target_slot)),
        }));
    }

    Ok(Some(SlotState::Live {
        offset,
        length: resident,
    }))
}

/// RecordPage provides methods to interpret and manipulate a page
/// as a slotted page with variable-length records.
pub struct RecordPage<'a> {
    page_id: PageId,
    data: &'a mut [u8],
}

impl<'a> RecordPage<'a> {
    /// Creates a new RecordPage view over the given data buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn new(page_id: PageId, data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { page_id, data }
    }

    /// Initializes an empty record page.
    pub fn init(&mut self) {
        self.data.fill(0);
        self.set_num_slots(0);
        self.set_free_bytes((PAGE_SIZE - FOOTER_SIZE) as u16);
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the number of slot directory entries, tombstones included.
    pub fn num_slots(&self) -> u16 {
        num_slots_of(self.data)
    }

    fn set_num_slots(&mut self, num_slots: u16) {
        self.data[NUM_SLOTS_OFFSET..NUM_SLOTS_OFFSET + 2].copy_from_slice(&num_slots.to_le_bytes());
    }

    /// Returns the number of unused bytes between the data and the slot directory.
    pub fn free_bytes(&self) -> usize {
        free_bytes_of(self.data) as usize
    }

    fn set_free_bytes(&mut self, free: u16) {
        self.data[FREE_BYTES_OFFSET..FREE_BYTES_OFFSET + 2].copy_from_slice(&free.to_le_bytes());
    }

    fn data_end(&self) -> usize {
        data_end_of(self.data)
    }

    /// Gets a slot's state, or None when the slot number is out of range.
    pub fn slot(&self, slot_id: SlotId) -> Result<Option<SlotState>> {
        slot_state_of(self.page_id, self.data, slot_id)
    }

    fn set_raw_slot(&mut self, slot_num: u16, offset: i16, length: i16) {
        let entry = slot_entry_offset(slot_num);
        self.data[entry..entry + 2].copy_from_slice(&offset.to_le_bytes());
        self.data[entry + 2..entry + 4].copy_from_slice(&length.to_le_bytes());
    }

    /// Returns the first tombstoned slot, if any.
    pub fn find_free_slot(&self) -> Option<SlotId> {
        (0..self.num_slots())
            .map(SlotId::new)
            .find(|&slot_id| matches!(self.slot(slot_id), Ok(Some(SlotState::Tombstone))))
    }

    /// Returns whether a record of `len` bytes fits, counting a new slot
    /// entry when no tombstone can be reused.
    pub fn can_insert(&self, len: usize) -> bool {
        let needed = if self.find_free_slot().is_some() {
            len
        } else {
            len + SLOT_SIZE
        };
        self.free_bytes() >= needed
    }

    /// Inserts a record at the end of the data region and returns its slot.
    pub fn insert_record(&mut self, record: &[u8]) -> Result<SlotId> {
        let len = record.len();
        let reused = self.find_free_slot();
        let needed = if reused.is_some() { len } else { len + SLOT_SIZE };

        if self.free_bytes() < needed {
            return Err(FolioError::RecordTooLarge {
                size: len,
                capacity: self.free_bytes().saturating_sub(SLOT_SIZE),
            });
        }

        let offset = self.data_end();
        self.data[offset..offset + len].copy_from_slice(record);

        let slot_id = match reused {
            Some(slot_id) => slot_id,
            None => {
                let slot_num = self.num_slots();
                self.set_num_slots(slot_num + 1);
                SlotId::new(slot_num)
            }
        };
        self.set_raw_slot(slot_id.as_u16(), offset as i16, len as i16);
        self.set_free_bytes((self.free_bytes() - needed) as u16);

        Ok(slot_id)
    }

    /// Returns the bytes of a live record.
    pub fn record(&self, slot_id: SlotId) -> Result<&[u8]> {
        match self.slot(slot_id)? {
            Some(SlotState::Live { offset, length }) => Ok(&self.data[offset..offset + length]),
            _ => Err(FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id))),
        }
    }

    /// Moves every byte after the slot's resident bytes so that the slot
    /// occupies `new_len` bytes, fixing up the offsets of the records that
    /// followed it. Returns the slot's data offset.
    fn resize_resident(&mut self, slot_id: SlotId, state: SlotState, new_len: usize) -> Result<usize> {
        let offset = state.offset().ok_or_else(|| {
            FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id))
        })?;
        let old_len = state.resident_len();
        let free = self.free_bytes();

        if new_len > old_len && new_len - old_len > free {
            return Err(FolioError::RecordTooLarge {
                size: new_len,
                capacity: old_len + free,
            });
        }

        let data_end = self.data_end();
        let old_tail = offset + old_len;
        let new_tail = offset + new_len;
        self.data.copy_within(old_tail..data_end, new_tail);

        if new_len != old_len {
            for i in 0..self.num_slots() {
                if i == slot_id.as_u16() {
                    continue;
                }
                let entry = slot_entry_offset(i);
                let other = read_i16(self.data, entry);
                if other != TOMBSTONE_OFFSET && other as usize >= old_tail {
                    let moved = other as isize + new_len as isize - old_len as isize;
                    let length = read_i16(self.data, entry + 2);
                    self.set_raw_slot(i, moved as i16, length);
                }
            }
        }

        let new_free = free as isize + old_len as isize - new_len as isize;
        self.set_free_bytes(new_free as u16);
        Ok(offset)
    }

    /// Rewrites a live record in place, shifting the records after it.
    /// Fails with `RecordTooLarge` when the page cannot absorb the growth.
    pub fn update_record(&mut self, slot_id: SlotId, record: &[u8]) -> Result<()> {
        let state = match self.slot(slot_id)? {
            Some(state @ SlotState::Live { .. }) => state,
            _ => return Err(FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id))),
        };

        let offset = self.resize_resident(slot_id, state, record.len())?;
        self.data[offset..offset + record.len()].copy_from_slice(record);
        self.set_raw_slot(slot_id.as_u16(), offset as i16, record.len() as i16);
        Ok(())
    }

    /// Returns whether a live record can be rewritten in place with `len` bytes.
    pub fn can_update(&self, slot_id: SlotId, len: usize) -> Result<bool> {
        match self.slot(slot_id)? {
            Some(state @ SlotState::Live { .. }) => Ok(len <= state.resident_len() + self.free_bytes()),
            _ => Err(FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id))),
        }
    }

    /// Replaces a slot's bytes with a forwarding pointer to `target`.
    pub fn set_forward(&mut self, slot_id: SlotId, target: RecordId) -> Result<()> {
        let state = match self.slot(slot_id)? {
            Some(SlotState::Tombstone) | None => {
                return Err(FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id)))
            }
            Some(state) => state,
        };

        let offset = self.resize_resident(slot_id, state, FORWARD_POINTER_SIZE)?;
        self.data[offset..offset + 4].copy_from_slice(&target.page_id.as_u32().to_le_bytes());
        self.data[offset + 4..offset + 6].copy_from_slice(&target.slot_id.as_u16().to_le_bytes());
        self.set_raw_slot(slot_id.as_u16(), offset as i16, FORWARDED_LENGTH);
        Ok(())
    }

    /// Deletes a live record or forwarding stub, reclaiming its bytes and
    /// tombstoning the slot. The slot entry itself stays in the directory.
    pub fn delete_record(&mut self, slot_id: SlotId) -> Result<()> {
        let state = match self.slot(slot_id)? {
            Some(SlotState::Tombstone) | None => {
                return Err(FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id)))
            }
            Some(state) => state,
        };

        self.resize_resident(slot_id, state, 0)?;
        self.set_raw_slot(slot_id.as_u16(), TOMBSTONE_OFFSET, 0);
        Ok(())
    }

    /// Returns the number of live records resident on this page.
    pub fn record_count(&self) -> usize {
        RecordPageRef::new(self.page_id, &*self.data).record_count()
    }
}

/// Read-only view of a record page.
pub struct RecordPageRef<'a> {
    page_id: PageId,
    data: &'a [u8],
}

impl<'a> RecordPageRef<'a> {
    /// Creates a new read-only RecordPage view.
    pub fn new(page_id: PageId, data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { page_id, data }
    }

    pub fn num_slots(&self) -> u16 {
        num_slots_of(self.data)
    }

    pub fn free_bytes(&self) -> usize {
        free_bytes_of(self.data) as usize
    }

    pub fn slot(&self, slot_id: SlotId) -> Result<Option<SlotState>> {
        slot_state_of(self.page_id, self.data, slot_id)
    }

    /// Returns the bytes of a live record.
    pub fn record(&self, slot_id: SlotId) -> Result<&'a [u8]> {
        match self.slot(slot_id)? {
            Some(SlotState::Live { offset, length }) => Ok(&self.data[offset..offset + length]),
            _ => Err(FolioError::RecordNotFound(RecordId::new(self.page_id, slot_id))),
        }
    }

    /// Returns the number of live records resident on this page.
    pub fn record_count(&self) -> usize {
        (0..self.num_slots())
            .filter(|&i| matches!(self.slot(SlotId::new(i)), Ok(Some(SlotState::Live { .. }))))
            .count()
    }
}
