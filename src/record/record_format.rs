//! On-page record body codec.
//!
//! ```text
//! +---------------+-----------------------------+----------------------+
//! | num_attrs u32 | offset directory            | attribute data       |
//! |               | (num_attrs x i32, -1 = NULL)| (fields back to back)|
//! +---------------+-----------------------------+----------------------+
//! ```
//!
//! Directory offsets are relative to the start of the attribute data, so a
//! single attribute can be located without walking the fields before it.
//!
//! A record that an update moved off its home slot has the high bit of
//! `num_attrs` set and carries its home RID (page u32, slot u16) between the
//! count and the directory. The home RID is the only address such a record
//! answers to.

use bytes::{Buf, BufMut};

use crate::common::{FolioError, PageId, RecordId, Result, SlotId, FORWARD_POINTER_SIZE};
use crate::tuple::{join_fields, null_bitmap_size, set_null, split_tuple, Attribute};

const NUM_ATTRS_SIZE: usize = 4;
const DIRECTORY_ENTRY_SIZE: usize = 4;
const NULL_OFFSET: i32 = -1;

const MOVED_FLAG: u32 = 1 << 31;
const HOME_RID_SIZE: usize = 6;

struct RecordHeader {
    num_attrs: usize,
    home: Option<RecordId>,
    /// Offset of the attribute offset directory.
    directory: usize,
}

fn parse_header(record: &[u8]) -> Result<RecordHeader> {
    let mut header = record;
    if header.remaining() < NUM_ATTRS_SIZE {
        return Err(malformed("missing attribute count"));
    }
    let raw = header.get_u32_le();
    if raw & MOVED_FLAG == 0 {
        return Ok(RecordHeader {
            num_attrs: raw as usize,
            home: None,
            directory: NUM_ATTRS_SIZE,
        });
    }

    if header.remaining() < HOME_RID_SIZE {
        return Err(malformed("truncated home RID"));
    }
    let page = header.get_u32_le();
    let slot = header.get_u16_le();
    Ok(RecordHeader {
        num_attrs: (raw & !MOVED_FLAG) as usize,
        home: Some(RecordId::new(PageId::new(page), SlotId::new(slot))),
        directory: NUM_ATTRS_SIZE + HOME_RID_SIZE,
    })
}

fn malformed(reason: impl Into<String>) -> FolioError {
    FolioError::InvalidTuple(format!("malformed record: {}", reason.into()))
}

/// Re-encodes a flat tuple into the record body format.
///
/// The result is padded to at least a forwarding pointer's size, so the record
/// can later be replaced in place by a pointer to its new location.
pub fn encode_record(attrs: &[Attribute], tuple: &[u8]) -> Result<Vec<u8>> {
    let fields = split_tuple(attrs, tuple)?;
    let data_size: usize = fields.iter().flatten().map(|f| f.len()).sum();

    let mut record =
        Vec::with_capacity(NUM_ATTRS_SIZE + fields.len() * DIRECTORY_ENTRY_SIZE + data_size);
    record.put_u32_le(fields.len() as u32);

    let mut offset = 0usize;
    for field in &fields {
        match field {
            Some(field) => {
                record.put_i32_le(offset as i32);
                offset += field.len();
            }
            None => record.put_i32_le(NULL_OFFSET),
        }
    }
    for field in fields.iter().flatten() {
        record.put_slice(field);
    }

    if record.len() < FORWARD_POINTER_SIZE {
        record.resize(FORWARD_POINTER_SIZE, 0);
    }
    Ok(record)
}

/// Locates the encoded bytes of attribute `index` inside a record body,
/// without decoding any other attribute. None means the attribute is null.
pub fn record_field<'r>(attrs: &[Attribute], record: &'r [u8], index: usize) -> Result<Option<&'r [u8]>> {
    let attr = attrs
        .get(index)
        .ok_or_else(|| malformed(format!("no attribute at position {}", index)))?;

    let header = parse_header(record)?;
    if index >= header.num_attrs {
        // Attributes added to the descriptor after this record was written.
        return Ok(None);
    }

    let data_start = header.directory + header.num_attrs * DIRECTORY_ENTRY_SIZE;
    if record.len() < data_start {
        return Err(malformed("truncated offset directory"));
    }

    let entry = header.directory + index * DIRECTORY_ENTRY_SIZE;
    let mut entry_bytes = &record[entry..entry + DIRECTORY_ENTRY_SIZE];
    let offset = entry_bytes.get_i32_le();
    if offset == NULL_OFFSET {
        return Ok(None);
    }
    if offset < 0 {
        return Err(malformed(format!("negative offset for {}", attr.name())));
    }

    let start = data_start + offset as usize;
    let field = record
        .get(start..)
        .ok_or_else(|| malformed(format!("{} starts past the record", attr.name())))?;
    let size = attr
        .attr_type()
        .encoded_len(field)
        .ok_or_else(|| malformed(format!("{} is truncated", attr.name())))?;
    Ok(Some(&field[..size]))
}

/// Returns the home RID of a moved record, or None for a record still
/// living in the slot it was inserted into.
pub fn record_home(record: &[u8]) -> Result<Option<RecordId>> {
    Ok(parse_header(record)?.home)
}

/// Rewrites a record body as a moved copy owned by `home`. Any home RID
/// already present is replaced.
pub fn with_home(record: &[u8], home: RecordId) -> Result<Vec<u8>> {
    let header = parse_header(record)?;
    let body = &record[header.directory..];

    let mut moved = Vec::with_capacity(NUM_ATTRS_SIZE + HOME_RID_SIZE + body.len());
    moved.put_u32_le(header.num_attrs as u32 | MOVED_FLAG);
    moved.put_u32_le(home.page_id.as_u32());
    moved.put_u16_le(home.slot_id.as_u16());
    moved.put_slice(body);
    Ok(moved)
}

/// Decodes a record body back into the flat tuple format.
pub fn decode_record(attrs: &[Attribute], record: &[u8]) -> Result<Vec<u8>> {
    let all: Vec<usize> = (0..attrs.len()).collect();
    project_record(attrs, record, &all)
}

/// Builds a flat tuple holding only the attributes at `indices`, in that
/// order, with its own null bitmap.
pub fn project_record(attrs: &[Attribute], record: &[u8], indices: &[usize]) -> Result<Vec<u8>> {
    let fields = indices
        .iter()
        .map(|&i| record_field(attrs, record, i))
        .collect::<Result<Vec<_>>>()?;
    Ok(join_fields(&fields))
}

/// Reads one attribute as a one-attribute flat tuple: a single null-bitmap
/// byte followed by the value, or only the bitmap byte when null.
pub fn read_record_attribute(attrs: &[Attribute], record: &[u8], index: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; null_bitmap_size(1)];
    match record_field(attrs, record, index)? {
        Some(field) => out.extend_from_slice(field),
        None => set_null(&mut out, 0),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{decode_tuple, TupleBuilder, Value};

    fn create_test_attrs() -> Vec<Attribute> {
        vec![
            Attribute::varchar("name", 50),
            Attribute::int("age"),
            Attribute::float("height"),
        ]
    }

    #[test]
    fn test_record_layout() {
        let attrs = create_test_attrs();
        let tuple = TupleBuilder::new(&attrs)
            .value("ab")
            .null()
            .value(1.0f32)
            .build()
            .unwrap();

        let record = encode_record(&attrs, &tuple).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(&0i32.to_le_bytes());
        expected.extend_from_slice(&(-1i32).to_le_bytes());
        expected.extend_from_slice(&6i32.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        assert_eq!(record, expected);
    }

    #[test]
    fn test_record_decode_restores_tuple() {
        let attrs = create_test_attrs();
        let tuple = TupleBuilder::new(&attrs)
            .null()
            .value(30i32)
            .null()
            .build()
            .unwrap();

        let record = encode_record(&attrs, &tuple).unwrap();
        assert_eq!(decode_record(&attrs, &record).unwrap(), tuple);
    }

    #[test]
    fn test_record_padded_to_forward_pointer() {
        let record = encode_record(&[], &[]).unwrap();
        assert_eq!(record.len(), FORWARD_POINTER_SIZE);
        assert_eq!(decode_record(&[], &record).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_read_record_attribute() {
        let attrs = create_test_attrs();
        let tuple = TupleBuilder::new(&attrs)
            .value("tom")
            .null()
            .value(1.5f32)
            .build()
            .unwrap();
        let record = encode_record(&attrs, &tuple).unwrap();

        let height = read_record_attribute(&attrs, &record, 2).unwrap();
        assert_eq!(height[0], 0);
        assert_eq!(&height[1..], &1.5f32.to_le_bytes());

        let age = read_record_attribute(&attrs, &record, 1).unwrap();
        assert_eq!(age, vec![0x80]);
    }

    #[test]
    fn test_project_record() {
        let attrs = create_test_attrs();
        let tuple = TupleBuilder::new(&attrs)
            .value("amy")
            .value(41i32)
            .null()
            .build()
            .unwrap();
        let record = encode_record(&attrs, &tuple).unwrap();

        let projected = project_record(&attrs, &record, &[2, 0]).unwrap();
        let projected_attrs = vec![attrs[2].clone(), attrs[0].clone()];
        assert_eq!(
            decode_tuple(&projected_attrs, &projected).unwrap(),
            vec![Value::Null, Value::VarChar("amy".into())]
        );
    }

    #[test]
    fn test_moved_record_keeps_fields() {
        let attrs = create_test_attrs();
        let tuple = TupleBuilder::new(&attrs)
            .value("kim")
            .value(7i32)
            .null()
            .build()
            .unwrap();
        let record = encode_record(&attrs, &tuple).unwrap();
        assert_eq!(record_home(&record).unwrap(), None);

        let home = RecordId::new(PageId::new(3), SlotId::new(9));
        let moved = with_home(&record, home).unwrap();
        assert_eq!(moved.len(), record.len() + HOME_RID_SIZE);
        assert_eq!(record_home(&moved).unwrap(), Some(home));
        assert_eq!(decode_record(&attrs, &moved).unwrap(), tuple);
        assert_eq!(read_record_attribute(&attrs, &moved, 1).unwrap(), vec![0, 7, 0, 0, 0]);

        let elsewhere = RecordId::new(PageId::new(0), SlotId::new(1));
        let moved_again = with_home(&moved, elsewhere).unwrap();
        assert_eq!(moved_again.len(), moved.len());
        assert_eq!(record_home(&moved_again).unwrap(), Some(elsewhere));
        assert_eq!(decode_record(&attrs, &moved_again).unwrap(), tuple);
    }

    #[test]
    fn test_record_field_malformed() {
        let attrs = create_test_attrs();
        assert!(record_field(&attrs, &[1, 0], 0).is_err());

        let mut record = Vec::new();
        record.extend_from_slice(&1u32.to_le_bytes());
        record.extend_from_slice(&0i32.to_le_bytes());
        record.extend_from_slice(&10u32.to_le_bytes());
        assert!(record_field(&attrs, &record, 0).is_err());
    }
}
