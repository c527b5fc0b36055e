mod btree_index;
mod btree_iterator;
mod btree_page;
mod key_comparator;

pub use btree_index::BTreeIndex;
pub use btree_iterator::{BTreeIterator, ScanBound};
pub use btree_page::{BTreeNode, BTreeNodeRef, ChildEntry, IndexEntry};
pub use key_comparator::{validate_key, validate_key_encoding, KeyComparator};
