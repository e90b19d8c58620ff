/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Page ID of the header page holding (index name, root page id) records
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Number of entries a page-table hash bucket holds before splitting
pub const DEFAULT_BUCKET_SIZE: usize = 4;

use super::types::PageId;
