//! Folio - slotted-page record files and disk-resident B+ tree indexes
//!
//! Every relation lives in its own paged file. Records are variable-length and
//! packed into fixed-size pages behind a slot directory; an index is a second
//! file holding a B+ tree over one attribute, whose entries point back at
//! record IDs.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page I/O and page formats
//!   - `DiskManager`: whole-page reads, writes and appends plus persisted I/O counters
//!   - `RecordPage`: slotted page with tombstones and forwarding pointers
//!
//! - **Tuples** (`tuple`): attribute descriptors, typed values and the flat
//!   null-bitmap tuple format callers exchange with the record store
//!
//! - **Records** (`record`): `RecordStore` with stable record IDs across
//!   updates, point attribute reads and filtered, projected scans
//!
//! - **Index** (`index`): `BTreeIndex` with split propagation, leaf-only
//!   deletion, range scans and a structural dump
//!
//! # Example
//!
//! ```rust,no_run
//! use folio::index::BTreeIndex;
//! use folio::record::RecordStore;
//! use folio::tuple::{AttrType, Attribute, TupleBuilder};
//!
//! let attrs = vec![Attribute::int("id"), Attribute::varchar("name", 32)];
//!
//! RecordStore::create("people.rec").unwrap();
//! let store = RecordStore::open("people.rec").unwrap();
//!
//! BTreeIndex::create("people_id.idx", AttrType::Int).unwrap();
//! let mut index = BTreeIndex::open("people_id.idx").unwrap();
//!
//! let tuple = TupleBuilder::new(&attrs).value(1i32).value("ada").build().unwrap();
//! let rid = store.insert(&attrs, &tuple).unwrap();
//! index.insert(&1i32.to_le_bytes(), rid).unwrap();
//!
//! for entry in index.scan(None, None, true, true).unwrap() {
//!     let (_key, rid) = entry.unwrap();
//!     println!("{:?}", store.read(&attrs, rid).unwrap());
//! }
//! ```

pub mod common;
pub mod index;
pub mod record;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{FolioError, PageId, RecordId, Result, SlotId};
