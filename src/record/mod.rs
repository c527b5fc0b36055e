mod predicate;
mod record_format;
mod record_store;
mod scan;

pub use predicate::{CompOp, ScanCondition};
pub use record_format::{
    decode_record, encode_record, project_record, read_record_attribute, record_field, record_home,
    with_home,
};
pub use record_store::RecordStore;
pub use scan::RecordScan;
