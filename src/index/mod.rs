pub mod b_plus_tree;
pub mod index_iterator;
pub mod key_comparator;
pub mod tree_page;

pub use b_plus_tree::BPlusTree;
pub use index_iterator::IndexIterator;
pub use key_comparator::{BytewiseComparator, KeyComparator, U32Comparator};
pub use tree_page::{InternalPage, InternalPageRef, LeafPage, LeafPageRef};
