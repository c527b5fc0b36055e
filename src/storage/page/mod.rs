mod slotted_page;

pub use slotted_page::{RecordPage, RecordPageRef, SlotState, FOOTER_SIZE, SLOT_SIZE};
