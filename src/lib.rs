//! Bedrock - the storage access core of a disk-backed database
//!
//! The crate caches fixed-size pages between persistent storage and memory
//! and maintains an ordered index on top of that cache.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads, writes, and allocates pages in the database file
//!   - `DiskScheduler`: background worker thread processing I/O requests
//!   - `LogManager`: write-ahead log sink, flushed before dirty write-back
//!   - `HeaderPage`: page 0 layout mapping index names to root page ids
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: pins pages in frames and writes them back on eviction
//!   - `LruKReplacer`: LRU-K eviction policy over the frame slots
//!   - `ExtendibleHashTable`: page-id to frame-id directory with dynamic doubling
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pin-and-latch handles
//!
//! - **Index** (`index`): a concurrent B+ tree
//!   - `BPlusTree`: point lookup, insert, remove under latch crabbing
//!   - `IndexIterator`: ascending range scan over the leaf chain
//!   - `KeyComparator`: caller-supplied total order over opaque keys
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bedrock::buffer::BufferPoolManager;
//! use bedrock::index::{BPlusTree, U32Comparator};
//! use bedrock::storage::disk::DiskManager;
//! use bedrock::common::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager, None));
//!
//! let tree = BPlusTree::new("orders_pk", bpm, Arc::new(U32Comparator), 4, 64, 64).unwrap();
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! tree.insert(&42u32.to_le_bytes(), rid).unwrap();
//! assert_eq!(tree.get_value(&42u32.to_le_bytes()).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BedrockError, FrameId, PageId, RecordId, Result, SlotId};
